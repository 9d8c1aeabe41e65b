//! Fixes, stops and the payloads exchanged with the backend.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::geo::Position;

/// Most recent accepted geolocation reading for the rider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserFix {
    pub position: Position,
    pub timestamp: DateTime<Utc>,
}

/// Most recent polled telemetry for the tracked vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleFix {
    pub position: Position,

    /// Reported speed in km/h, never negative.
    pub speed_kmh: f64,
    pub timestamp: DateTime<Utc>,
}

/// A stop on a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Stop {
    #[must_use]
    pub const fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

/// One row of the ordered route stop listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteStop {
    pub stop_order: i64,

    // the hosted backend names the joined row `stops`
    #[serde(alias = "stops")]
    pub stop: Option<Stop>,
}

/// Ordered stops of the route the tracked vehicle is assigned to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RouteStopList(Vec<Stop>);

impl RouteStopList {
    #[must_use]
    pub const fn new(stops: Vec<Stop>) -> Self {
        Self(stops)
    }

    /// Flattens route rows into stops ordered by `stop_order`. Rows without a
    /// joined stop are skipped.
    #[must_use]
    pub fn from_route_stops(mut rows: Vec<RouteStop>) -> Self {
        rows.sort_by_key(|row| row.stop_order);
        Self(rows.into_iter().filter_map(|row| row.stop).collect())
    }

    #[must_use]
    pub fn stops(&self) -> &[Stop] {
        &self.0
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Polyline through every stop, in route order.
    #[must_use]
    pub fn path(&self) -> Vec<Position> {
        self.0.iter().map(Stop::position).collect()
    }
}

/// Backend `buses` row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Bus {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub route_id: Option<String>,
}

/// Backend live position payload. An empty object means the vehicle has
/// never reported.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveReading {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp: Option<String>,
}

impl LiveReading {
    /// Converts to a fix, or `None` when no position has been reported.
    /// Missing, negative or non-finite speeds are stored as zero.
    #[must_use]
    pub fn into_fix(self, received_at: DateTime<Utc>) -> Option<VehicleFix> {
        let position = Position::new(self.latitude?, self.longitude?);
        if !position.is_valid() {
            return None;
        }

        let speed_kmh = self.speed.filter(|s| s.is_finite()).unwrap_or_default().max(0.0);
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map_or(received_at, |ts| ts.with_timezone(&Utc));

        Some(VehicleFix { position, speed_kmh, timestamp })
    }
}

/// Time for the vehicle to reach the rider's nearest stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtaEstimate {
    pub stop: Stop,
    pub minutes: f64,

    /// Straight-line distance from the vehicle to `stop`.
    pub distance_km: f64,

    /// Speed the estimate was computed with.
    pub speed_kmh: f64,
}

impl EtaEstimate {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn display_minutes(&self) -> i64 {
        self.minutes.round() as i64
    }
}

impl fmt::Display for EtaEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins to {}", self.display_minutes(), self.stop.name)
    }
}

/// Calculator output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimate {
    Arrival(EtaEstimate),

    /// The nearest stop is implausibly far; most likely a coarse network
    /// location rather than a distant rider.
    OutOfRange { distance_km: f64 },
}

impl Estimate {
    /// Target stop of the estimate, if any.
    #[must_use]
    pub const fn target(&self) -> Option<&Stop> {
        match self {
            Self::Arrival(eta) => Some(&eta.stop),
            Self::OutOfRange { .. } => None,
        }
    }
}

impl fmt::Display for Estimate {
    #[allow(clippy::cast_possible_truncation)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arrival(eta) => fmt::Display::fmt(eta, f),
            Self::OutOfRange { distance_km } => {
                write!(f, "Bus running (You are {}km away)", distance_km.round() as i64)
            }
        }
    }
}

// Identifiers arrive as numbers or strings depending on the table.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number, got {other}"))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!("expected string or number, got {other}"))),
    }
}
