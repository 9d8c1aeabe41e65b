use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use realtime::HttpError;
use tokio::sync::watch;
use tracker::{Error, TrackingSnapshot};

pub fn router(snapshots: watch::Receiver<TrackingSnapshot>) -> Router {
    Router::new()
        .route("/track", get(track))
        .route("/health", get(health))
        .with_state(snapshots)
}

async fn track(
    State(snapshots): State<watch::Receiver<TrackingSnapshot>>,
) -> Result<Json<TrackingSnapshot>, HttpError> {
    if snapshots.has_changed().is_err() {
        return Err(Error::Internal("tracking view closed".to_string()).into());
    }
    let snapshot = snapshots.borrow().clone();
    Ok(Json(snapshot))
}

async fn health() -> &'static str {
    "OK"
}
