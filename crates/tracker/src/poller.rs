//! Fixed-interval live position poller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, warn};

use crate::view::Update;
use crate::{Error, Provider, api};

pub struct BusPoller<P> {
    provider: Arc<P>,
    bus_id: String,
    interval: Duration,
}

impl<P: Provider + 'static> BusPoller<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, bus_id: impl Into<String>, interval: Duration) -> Self {
        Self { provider, bus_id: bus_id.into(), interval }
    }

    /// Polls on every tick until shutdown. The first tick fires immediately.
    ///
    /// Each fetch runs in its own task so a slow response never delays the
    /// next tick; results reach the view in completion order, tagged with the
    /// sequence number of the tick that issued them.
    pub async fn run(self, updates: mpsc::Sender<Update>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut seq = 0_u64;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    seq += 1;
                    let provider = Arc::clone(&self.provider);
                    let bus_id = self.bus_id.clone();
                    let updates = updates.clone();
                    let poll = async move {
                        poll_once(&*provider, &bus_id, seq, &updates).await;
                    };
                    tokio::spawn(poll.in_current_span());
                }
            }
        }
        debug!(bus_id = %self.bus_id, polls = seq, "poller stopped");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
    Applied,
    NoData,
    Failed,
}

async fn poll_once<P: Provider>(
    provider: &P, bus_id: &str, seq: u64, updates: &mpsc::Sender<Update>,
) -> PollOutcome {
    match api::live_position(bus_id, provider).await {
        Ok(Some(fix)) => {
            // the view may already be gone; the result is then dropped
            if updates.send(Update::VehicleFix { seq, fix }).await.is_err() {
                debug!(bus_id = %bus_id, seq, "view closed, dropping live position");
            }
            PollOutcome::Applied
        }
        Ok(None) => {
            debug!(bus_id = %bus_id, seq, "no live position reported yet");
            PollOutcome::NoData
        }
        Err(Error::InvalidFormat(e)) => {
            debug!(bus_id = %bus_id, seq, error = %e, "unreadable live position, treating as no data");
            PollOutcome::NoData
        }
        Err(e) => {
            warn!(
                monotonic_counter.poll_failures = 1,
                error = %e,
                transient = e.is_transient(),
                bus_id = %bus_id,
                seq,
                "polling live position failed"
            );
            PollOutcome::Failed
        }
    }
}
