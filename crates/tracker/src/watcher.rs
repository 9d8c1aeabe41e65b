//! Device geolocation watcher.
//!
//! Subscribes to the platform position stream, drops readings that move less
//! than the jitter threshold, and forwards accepted fixes to the view.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use realtime::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::Result;
use crate::geo::Position;
use crate::types::UserFix;
use crate::view::Update;

/// Options handed to the platform when subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self { enable_high_accuracy: true, timeout: Duration::from_secs(5), maximum_age: Duration::ZERO }
    }
}

/// Platform handle for an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// An active position subscription. Per-reading platform errors arrive on
/// the same stream as positions.
#[derive(Debug)]
pub struct PositionWatch {
    pub id: WatchId,
    pub readings: mpsc::Receiver<Result<Position>>,
}

/// The device's location capability.
pub trait Geolocation: Send + Sync {
    /// Starts a continuous position subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GeolocationUnavailable`] when the platform lacks or
    /// denies location access.
    fn watch_position(&self, options: &WatchOptions) -> Result<PositionWatch>;

    /// Releases a subscription started by [`Geolocation::watch_position`].
    fn clear_watch(&self, id: WatchId);
}

// Clears the platform subscription however the watcher exits.
struct WatchGuard<'a, G: Geolocation + ?Sized> {
    geolocation: &'a G,
    id: WatchId,
}

impl<G: Geolocation + ?Sized> Drop for WatchGuard<'_, G> {
    fn drop(&mut self) {
        debug!(watch_id = self.id.0, "clearing position watch");
        self.geolocation.clear_watch(self.id);
    }
}

/// Keeps the last accepted fix and rejects readings within the threshold.
#[derive(Debug, Clone)]
pub struct JitterFilter {
    threshold_m: f64,
    last: Option<UserFix>,
}

impl JitterFilter {
    #[must_use]
    pub const fn new(threshold_m: f64) -> Self {
        Self { threshold_m, last: None }
    }

    /// Returns the new fix when `position` is accepted.
    pub fn accept(&mut self, position: Position, at: DateTime<Utc>) -> Option<UserFix> {
        if let Some(last) = &self.last
            && last.position.distance_m(&position) < self.threshold_m
        {
            return None;
        }

        let fix = UserFix { position, timestamp: at };
        self.last = Some(fix);
        Some(fix)
    }

    #[must_use]
    pub const fn current(&self) -> Option<&UserFix> {
        self.last.as_ref()
    }
}

pub struct GeolocationWatcher<G: ?Sized> {
    geolocation: Arc<G>,
    options: WatchOptions,
    filter: JitterFilter,
}

impl<G: Geolocation + ?Sized> GeolocationWatcher<G> {
    #[must_use]
    pub fn new(geolocation: Arc<G>, options: WatchOptions, threshold_m: f64) -> Self {
        Self { geolocation, options, filter: JitterFilter::new(threshold_m) }
    }

    /// Forwards accepted fixes until shutdown, the stream ends, or the view
    /// stops listening. A failed subscription is reported once.
    pub async fn run(mut self, updates: mpsc::Sender<Update>, mut shutdown: watch::Receiver<bool>) {
        let watch = match self.geolocation.watch_position(&self.options) {
            Ok(watch) => watch,
            Err(e) => {
                let e = match e {
                    Error::GeolocationUnavailable(_) => e,
                    other => Error::GeolocationUnavailable(other.to_string()),
                };
                warn!(monotonic_counter.geolocation_unavailable = 1, error = %e, "geolocation unavailable");
                if updates.send(Update::GeolocationFailed(e)).await.is_err() {
                    debug!("view closed before geolocation failure was delivered");
                }
                return;
            }
        };

        let _guard = WatchGuard { geolocation: &*self.geolocation, id: watch.id };
        let mut readings = watch.readings;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                reading = readings.recv() => {
                    let Some(reading) = reading else {
                        debug!("position stream ended");
                        break;
                    };
                    let position = match reading {
                        Ok(position) if position.is_valid() => position,
                        Ok(position) => {
                            warn!(position = %position, "discarding invalid position");
                            continue;
                        }
                        Err(e) => {
                            warn!(error = %e, "position reading failed");
                            continue;
                        }
                    };

                    let Some(fix) = self.filter.accept(position, Utc::now()) else {
                        continue;
                    };
                    if updates.send(Update::UserFix(fix)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}
