use std::env;
use std::time::Duration;

use tracing::warn;

use crate::geo::Position;

const DEFAULT_CENTER: Position = Position::new(11.342_156, 77.728_901);

/// Tracking view settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Live position polling cadence.
    pub poll_interval: Duration,

    /// Rider movement below this is treated as sensor jitter.
    pub jitter_threshold_m: f64,

    /// Nearest stops at or beyond this distance suppress the estimate.
    pub max_stop_distance_km: f64,

    /// Speed used when the vehicle reports none.
    pub default_speed_kmh: f64,

    /// Rider-to-vehicle distance above which the rider counts as "far".
    pub far_user_km: f64,

    /// Viewport centre when no fix is known.
    pub default_center: Position,
    pub default_zoom: u8,
    pub stale_polls: StalePolls,
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        let default_center = env::var("DEFAULT_CENTER")
            .ok()
            .and_then(|value| match value.parse::<Position>() {
                Ok(center) => Some(center),
                Err(err) => {
                    warn!(value = %value, error = %err, "invalid DEFAULT_CENTER; using default");
                    None
                }
            })
            .unwrap_or(DEFAULT_CENTER);
        let stale_polls = env::var("STALE_POLLS")
            .map(|value| StalePolls::parse(&value))
            .unwrap_or_default();

        Self {
            poll_interval: Duration::from_secs(env_u64("POLL_INTERVAL_SECS", 5).max(1)),
            jitter_threshold_m: env_f64("JITTER_THRESHOLD_M", 20.0),
            max_stop_distance_km: env_f64("MAX_STOP_DISTANCE_KM", 100.0),
            default_speed_kmh: env_f64("DEFAULT_SPEED_KMH", 30.0),
            far_user_km: env_f64("FAR_USER_KM", 500.0),
            default_center,
            default_zoom: zoom_level(env_u64("DEFAULT_ZOOM", 13), 13),
            stale_polls,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            jitter_threshold_m: 20.0,
            max_stop_distance_km: 100.0,
            default_speed_kmh: 30.0,
            far_user_km: 500.0,
            default_center: DEFAULT_CENTER,
            default_zoom: 13,
            stale_polls: StalePolls::default(),
        }
    }
}

/// What to do with a poll result that completes after a newer one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StalePolls {
    /// Apply in completion order; the last response to arrive wins.
    #[default]
    LastWriterWins,

    /// Drop results older than the newest applied poll.
    Discard,
}

impl StalePolls {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "discard" | "discard-stale" => Self::Discard,
            "last-writer-wins" | "" => Self::LastWriterWins,
            other => {
                warn!(value = %other, "unknown STALE_POLLS policy; using last-writer-wins");
                Self::LastWriterWins
            }
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    parse_f64(key, env::var(key).ok().as_deref(), default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    parse_u64(key, env::var(key).ok().as_deref(), default)
}

fn parse_f64(key: &str, value: Option<&str>, default: f64) -> f64 {
    let Some(value) = value else {
        return default;
    };
    match value.trim().parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => parsed,
        _ => {
            warn!(key, value, default, "invalid setting; using default");
            default
        }
    }
}

fn parse_u64(key: &str, value: Option<&str>, default: u64) -> u64 {
    let Some(value) = value else {
        return default;
    };
    value.trim().parse::<u64>().unwrap_or_else(|_| {
        warn!(key, value, default, "invalid setting; using default");
        default
    })
}

fn zoom_level(value: u64, default: u8) -> u8 {
    u8::try_from(value).unwrap_or_else(|_| {
        warn!(value, default, "DEFAULT_ZOOM out of range; using default");
        default
    })
}
