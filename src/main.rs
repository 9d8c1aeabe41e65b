//! # Bus Tracker
//!
//! Mounts a tracking view for one bus, serves its snapshot over HTTP and runs
//! until interrupted.

mod config;
mod geolocation;
mod http;
mod provider;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};
use tracker::{Config, Position, TrackingSnapshot, TrackingView};

use crate::geolocation::{DeviceGeolocation, Source};
use crate::provider::Provider;

#[derive(Parser)]
#[command(name = "bus-tracker")]
#[command(about = "Live bus position and arrival estimate for one bus")]
struct Args {
    /// Bus to track
    #[arg(env = "BUS_ID")]
    bus_id: String,

    /// Fixed rider position as `lat,lon`
    #[arg(long, env = "USER_LOCATION", conflicts_with = "gps_stdin")]
    user_location: Option<Position>,

    /// Read rider positions from stdin, one per line
    #[arg(long)]
    gps_stdin: bool,

    /// Address to serve the tracking snapshot on
    #[arg(long, env = "LISTEN_ADDR")]
    listen: Option<String>,
}

impl Args {
    const fn source(&self) -> Source {
        match self.user_location {
            Some(position) => Source::Fixed(position),
            None if self.gps_stdin => Source::Stdin,
            None => Source::Unavailable,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    Registry::default().with(filter).with(fmt::layer()).init();

    let args = Args::parse();
    let provider = Arc::new(Provider::new()?);
    let geolocation = Arc::new(DeviceGeolocation::new(args.source()));

    let view = TrackingView::mount(&args.bus_id, provider, geolocation, Config::from_env()).await;

    let addr = args.listen.clone().unwrap_or_else(config::get_listen_addr);
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, bus_id = %args.bus_id, session_id = %view.session_id(), "serving tracking snapshot");

    let updates = tokio::spawn(log_snapshots(view.subscribe()));
    let served = axum::serve(listener, http::router(view.subscribe()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving tracking snapshot");

    view.unmount().await;
    if let Err(e) = updates.await {
        warn!(error = %e, "snapshot logger failed");
    }
    served
}

async fn log_snapshots(mut snapshots: watch::Receiver<TrackingSnapshot>) {
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        info!(
            eta = %snapshot.eta_text,
            speed_kmh = snapshot.speed_kmh,
            gps = snapshot.gps_text,
            center = %snapshot.viewport.center,
            "tracking update"
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}
