//! # Tracking View
//!
//! Session object for one tracked bus. Owns the rider and vehicle fixes, the
//! route stops and everything derived from them. The geolocation watcher and
//! the live position poller run as independent tasks and feed a single
//! update loop over a channel; the loop applies each update and publishes a
//! fresh [`TrackingSnapshot`].

use std::sync::Arc;

use realtime::Error;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::{Config, StalePolls};
use crate::eta::Calculator;
use crate::geo::Position;
use crate::poller::BusPoller;
use crate::recenter::{Recenter, RecenterPolicy, Viewport};
use crate::types::{Estimate, RouteStopList, Stop, UserFix, VehicleFix};
use crate::watcher::{Geolocation, GeolocationWatcher, WatchOptions};
use crate::{Provider, api};

const UPDATE_BUFFER: usize = 32;

/// Messages from the watcher and poller to the view.
#[derive(Debug, Clone)]
pub enum Update {
    /// The watcher accepted a new rider position.
    UserFix(UserFix),

    /// The rider's position cannot be known for this session.
    GeolocationFailed(Error),

    /// A poll returned a vehicle position. `seq` orders polls by issue.
    VehicleFix { seq: u64, fix: VehicleFix },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpsStatus {
    Locating,
    Active,
    Unavailable,
}

impl GpsStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        // the page shows the same text whether or not location was refused
        match self {
            Self::Locating | Self::Unavailable => "Locating you...",
            Self::Active => "GPS Active",
        }
    }
}

/// Everything needed to draw the tracking page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingSnapshot {
    pub bus_id: String,
    pub user: Option<UserFix>,
    pub vehicle: Option<VehicleFix>,
    pub stops: RouteStopList,
    pub nearest_stop: Option<Stop>,
    pub estimate: Option<Estimate>,

    /// Estimate text, or "Calculating..." until the first estimate.
    pub eta_text: String,
    pub speed_kmh: f64,
    pub gps_status: GpsStatus,
    pub gps_text: &'static str,
    pub viewport: Viewport,

    /// Polyline through the route stops; empty unless there are two or more.
    pub route_path: Vec<Position>,

    /// Rider to nearest stop, present only while a nearest stop is set.
    pub walking_leg: Option<[Position; 2]>,
}

/// View state and the rules applied to each update.
#[derive(Debug, Clone)]
pub struct Tracker {
    bus_id: String,
    calculator: Calculator,
    policy: RecenterPolicy,
    stale_polls: StalePolls,
    zoom: u8,

    user: Option<UserFix>,
    vehicle: Option<VehicleFix>,
    stops: RouteStopList,
    nearest_stop: Option<Stop>,
    estimate: Option<Estimate>,
    recenter: Recenter,
    gps_status: GpsStatus,
    last_seq: u64,
}

impl Tracker {
    #[must_use]
    pub fn new(bus_id: impl Into<String>, stops: RouteStopList, config: &Config) -> Self {
        let policy = RecenterPolicy::new(config);
        Self {
            bus_id: bus_id.into(),
            calculator: Calculator::new(config),
            policy,
            stale_polls: config.stale_polls,
            zoom: config.default_zoom,
            user: None,
            vehicle: None,
            stops,
            nearest_stop: None,
            estimate: None,
            recenter: policy.recenter(None, None),
            gps_status: GpsStatus::Locating,
            last_seq: 0,
        }
    }

    /// Applies one update. Returns `false` when the state did not change.
    pub fn apply(&mut self, update: Update) -> bool {
        match update {
            Update::UserFix(fix) => {
                self.user = Some(fix);
                self.gps_status = GpsStatus::Active;
            }
            Update::GeolocationFailed(e) => {
                warn!(bus_id = %self.bus_id, error = %e, "continuing without rider position");
                self.gps_status = GpsStatus::Unavailable;
            }
            Update::VehicleFix { seq, fix } => {
                if seq < self.last_seq {
                    match self.stale_polls {
                        StalePolls::Discard => {
                            debug!(seq, newest = self.last_seq, "discarding stale poll result");
                            return false;
                        }
                        StalePolls::LastWriterWins => {
                            info!(
                                monotonic_counter.out_of_order_polls = 1,
                                seq,
                                newest = self.last_seq,
                                "applying out-of-order poll result"
                            );
                        }
                    }
                }
                self.last_seq = self.last_seq.max(seq);
                self.vehicle = Some(fix);
                self.estimate_arrival();
            }
        }

        self.recenter = self.policy.recenter(self.user.as_ref(), self.vehicle.as_ref());
        true
    }

    fn estimate_arrival(&mut self) {
        let (Some(user), Some(vehicle)) = (&self.user, &self.vehicle) else {
            return;
        };
        let Some(estimate) = self.calculator.estimate(user, vehicle, &self.stops) else {
            return;
        };

        self.nearest_stop = estimate.target().cloned();
        debug!(bus_id = %self.bus_id, estimate = %estimate, "estimate updated");
        self.estimate = Some(estimate);
    }

    #[must_use]
    pub fn snapshot(&self) -> TrackingSnapshot {
        let route_path = if self.stops.len() > 1 { self.stops.path() } else { Vec::new() };
        let walking_leg = match (&self.user, &self.nearest_stop) {
            (Some(user), Some(stop)) => Some([user.position, stop.position()]),
            _ => None,
        };

        TrackingSnapshot {
            bus_id: self.bus_id.clone(),
            user: self.user,
            vehicle: self.vehicle,
            stops: self.stops.clone(),
            nearest_stop: self.nearest_stop.clone(),
            estimate: self.estimate.clone(),
            eta_text: self
                .estimate
                .as_ref()
                .map_or_else(|| "Calculating...".to_string(), ToString::to_string),
            speed_kmh: self.vehicle.map_or(0.0, |vehicle| vehicle.speed_kmh),
            gps_status: self.gps_status,
            gps_text: self.gps_status.label(),
            viewport: Viewport { center: self.recenter.center, zoom: self.zoom },
            route_path,
            walking_leg,
        }
    }

    #[must_use]
    pub const fn recenter(&self) -> &Recenter {
        &self.recenter
    }
}

/// A mounted tracking view. Dropping it (or calling [`TrackingView::unmount`])
/// stops the watcher, the poller and the update loop.
pub struct TrackingView {
    session_id: Uuid,
    bus_id: String,
    shutdown: watch::Sender<bool>,
    snapshot: watch::Receiver<TrackingSnapshot>,
    tasks: Vec<JoinHandle<()>>,
}

impl TrackingView {
    /// Loads the bus's route and starts the watcher, poller and update loop.
    /// A route that cannot be loaded leaves the view without stops.
    pub async fn mount<P, G>(
        bus_id: &str, provider: Arc<P>, geolocation: Arc<G>, config: Config,
    ) -> Self
    where
        P: Provider + 'static,
        G: Geolocation + ?Sized + 'static,
    {
        let session_id = Uuid::new_v4();
        let span = info_span!("tracking_view", %session_id, bus_id = %bus_id);

        let stops = match api::load_route(bus_id, &*provider).instrument(span.clone()).await {
            Ok(stops) => stops,
            Err(e) => {
                span.in_scope(|| warn!(error = %e, "failed to load route stops"));
                RouteStopList::default()
            }
        };
        span.in_scope(|| info!(stops = stops.len(), "tracking view mounted"));

        let tracker = Tracker::new(bus_id, stops, &config);
        let (snapshot_tx, snapshot_rx) = watch::channel(tracker.snapshot());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);

        let watcher = GeolocationWatcher::new(
            geolocation,
            WatchOptions::default(),
            config.jitter_threshold_m,
        );
        let poller = BusPoller::new(provider, bus_id, config.poll_interval);

        let tasks = vec![
            tokio::spawn(
                run_updates(tracker, updates_rx, snapshot_tx, shutdown_rx.clone())
                    .instrument(span.clone()),
            ),
            tokio::spawn(
                watcher.run(updates_tx.clone(), shutdown_rx.clone()).instrument(span.clone()),
            ),
            tokio::spawn(poller.run(updates_tx, shutdown_rx).instrument(span)),
        ];

        Self {
            session_id,
            bus_id: bus_id.to_string(),
            shutdown: shutdown_tx,
            snapshot: snapshot_rx,
            tasks,
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn bus_id(&self) -> &str {
        &self.bus_id
    }

    /// Current state of the view.
    #[must_use]
    pub fn snapshot(&self) -> TrackingSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.snapshot.clone()
    }

    /// Stops all tasks and waits for them to finish. Poll requests already in
    /// flight are not cancelled; their results are dropped.
    pub async fn unmount(mut self) {
        self.shutdown.send_replace(true);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!(session_id = %self.session_id, error = %e, "tracking task failed");
            }
        }
        info!(session_id = %self.session_id, bus_id = %self.bus_id, "tracking view unmounted");
    }
}

impl Drop for TrackingView {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn run_updates(
    mut tracker: Tracker, mut updates: mpsc::Receiver<Update>,
    snapshot: watch::Sender<TrackingSnapshot>, mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            update = updates.recv() => {
                let Some(update) = update else { break };
                if tracker.apply(update) {
                    snapshot.send_replace(tracker.snapshot());
                }
            }
        }
    }
}
