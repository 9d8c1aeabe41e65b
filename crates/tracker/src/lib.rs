//! # Bus Tracker
//!
//! Live tracking for a single bus: watches the rider's device position, polls
//! the bus's reported position, and derives an arrival estimate to the
//! rider's nearest route stop along with the map viewport.

pub mod api;
pub mod config;
pub mod eta;
pub mod geo;
pub mod poller;
pub mod recenter;
pub mod types;
pub mod view;
pub mod watcher;

pub use realtime::{Error, HttpRequest, Result};

pub use self::config::{Config, StalePolls};
pub use self::geo::{Position, haversine_km};
pub use self::types::*;
pub use self::view::{GpsStatus, Tracker, TrackingSnapshot, TrackingView, Update};
pub use self::watcher::{Geolocation, PositionWatch, WatchId, WatchOptions};

/// Capabilities the tracker needs from its host.
pub trait Provider: realtime::HttpRequest + realtime::Config {}

impl<T> Provider for T where T: realtime::HttpRequest + realtime::Config {}
