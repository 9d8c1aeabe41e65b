
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use pretty_assertions::assert_eq;
use tracker::{
    Config, Error, GpsStatus, Position, StalePolls, TrackingSnapshot, TrackingView, WatchId,
    WatchOptions,
};

use self::provider::{Canned, MockGeolocation, MockProvider};

async fn wait_until(
    view: &TrackingView, ready: impl FnMut(&TrackingSnapshot) -> bool,
) -> TrackingSnapshot {
    let mut snapshots = view.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(60), snapshots.wait_for(ready))
        .await
        .expect("timed out waiting for snapshot")
        .expect("view closed");
    snapshot.clone()
}

async fn mount(provider: &Arc<MockProvider>, geolocation: &Arc<MockGeolocation>) -> TrackingView {
    TrackingView::mount("7", Arc::clone(provider), Arc::clone(geolocation), Config::default())
        .await
}

#[tokio::test(start_paused = true)]
async fn estimate_from_both_fixes() {
    let provider = Arc::new(MockProvider::new());
    provider.push_live(Canned::live(11.05, 77.05, 30.0));
    let geolocation = Arc::new(MockGeolocation::new());

    let view = mount(&provider, &geolocation).await;
    assert_eq!(view.snapshot().stops.len(), 2);
    assert_eq!(view.snapshot().eta_text, "Calculating...");
    tokio::time::sleep(Duration::from_millis(10)).await;

    geolocation.push(Ok(Position::new(11.0, 77.0)));
    let snapshot = wait_until(&view, |s| s.estimate.is_some()).await;

    assert_eq!(snapshot.eta_text, "3 mins to Main Gate");
    assert_eq!(snapshot.gps_status, GpsStatus::Active);
    assert_eq!(snapshot.viewport.center, Position::new(11.05, 77.05));
    assert_eq!(snapshot.route_path.len(), 2);
    assert_eq!(
        snapshot.walking_leg,
        Some([Position::new(11.0, 77.0), Position::new(11.04, 77.04)])
    );

    view.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn watch_options() {
    let provider = Arc::new(MockProvider::new());
    let geolocation = Arc::new(MockGeolocation::new());

    let view = mount(&provider, &geolocation).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let options = geolocation.options().expect("watch started");
    assert_eq!(options, WatchOptions::default());
    assert!(options.enable_high_accuracy);
    assert_eq!(options.timeout, Duration::from_secs(5));
    assert_eq!(options.maximum_age, Duration::ZERO);

    view.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn polls_on_interval() {
    let provider = Arc::new(MockProvider::new());
    let geolocation = Arc::new(MockGeolocation::new());

    let view = mount(&provider, &geolocation).await;

    // ticks at 0s, 5s and 10s
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(provider.live_requests(), 3);

    view.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn jitter_is_ignored() {
    let provider = Arc::new(MockProvider::new());
    let geolocation = Arc::new(MockGeolocation::new());

    let view = mount(&provider, &geolocation).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    geolocation.push(Ok(Position::new(11.0, 77.0)));
    wait_until(&view, |s| s.user.is_some()).await;

    // ~11 m, then a reading error, then ~55 m
    geolocation.push(Ok(Position::new(11.0001, 77.0)));
    geolocation.push(Err(Error::GeolocationUnavailable("timeout".to_string())));
    geolocation.push(Ok(Position::new(11.0005, 77.0)));

    let snapshot =
        wait_until(&view, |s| s.user.is_some_and(|u| u.position != Position::new(11.0, 77.0)))
            .await;
    assert_eq!(snapshot.user.map(|u| u.position), Some(Position::new(11.0005, 77.0)));

    view.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn geolocation_denied() {
    let provider = Arc::new(MockProvider::new());
    provider.push_live(Canned::live(11.05, 77.05, 30.0));
    let geolocation = Arc::new(MockGeolocation::denied());

    let view = mount(&provider, &geolocation).await;
    let snapshot = wait_until(&view, |s| {
        s.gps_status == GpsStatus::Unavailable && s.vehicle.is_some()
    })
    .await;

    assert_eq!(snapshot.user, None);
    assert_eq!(snapshot.gps_text, "Locating you...");
    assert_eq!(snapshot.estimate, None);
    assert_eq!(snapshot.eta_text, "Calculating...");
    assert_eq!(snapshot.viewport.center, Position::new(11.05, 77.05));
    assert!(geolocation.cleared().is_empty());

    view.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn route_unavailable() {
    let mut provider = MockProvider::new();
    provider.route("/buses/7", Canned::status(StatusCode::INTERNAL_SERVER_ERROR));
    provider.push_live(Canned::live(11.05, 77.05, 30.0));
    let provider = Arc::new(provider);
    let geolocation = Arc::new(MockGeolocation::new());

    let view = mount(&provider, &geolocation).await;
    assert!(view.snapshot().stops.is_empty());
    tokio::time::sleep(Duration::from_millis(10)).await;

    geolocation.push(Ok(Position::new(11.0, 77.0)));
    let snapshot = wait_until(&view, |s| s.user.is_some() && s.vehicle.is_some()).await;

    assert_eq!(snapshot.estimate, None);
    assert!(snapshot.route_path.is_empty());
    assert_eq!(snapshot.nearest_stop, None);

    view.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn poll_failures_keep_last_fix() {
    let provider = Arc::new(MockProvider::new());
    provider.push_live(Canned::live(11.05, 77.05, 30.0));
    provider.push_live(Canned::status(StatusCode::BAD_GATEWAY));
    let geolocation = Arc::new(MockGeolocation::new());

    let view = mount(&provider, &geolocation).await;
    wait_until(&view, |s| s.vehicle.is_some()).await;

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert!(provider.live_requests() >= 3);

    let vehicle = view.snapshot().vehicle.expect("last fix kept");
    assert_eq!(vehicle.position, Position::new(11.05, 77.05));

    view.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn unmount_stops_everything() {
    let provider = Arc::new(MockProvider::new());

    // the first poll is still in flight when the view goes away
    provider.push_live(Canned::live(11.05, 77.05, 30.0).delayed(Duration::from_secs(30)));
    let geolocation = Arc::new(MockGeolocation::new());

    let view = mount(&provider, &geolocation).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(provider.live_requests(), 1);
    assert!(geolocation.is_watching());

    let snapshots = view.subscribe();
    view.unmount().await;

    assert_eq!(geolocation.cleared(), vec![WatchId(1)]);
    assert!(!geolocation.is_watching());

    // the in-flight response lands after teardown and is dropped
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(provider.live_requests(), 1);
    assert_eq!(snapshots.borrow().vehicle, None);
}

#[tokio::test(start_paused = true)]
async fn drop_releases_watch() {
    let provider = Arc::new(MockProvider::new());
    let geolocation = Arc::new(MockGeolocation::new());

    let view = mount(&provider, &geolocation).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(geolocation.is_watching());

    drop(view);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(geolocation.cleared(), vec![WatchId(1)]);
}

#[tokio::test(start_paused = true)]
async fn stale_polls_discarded() {
    let provider = Arc::new(MockProvider::new());

    // the first poll answers after the second one
    provider.push_live(Canned::live(11.01, 77.01, 30.0).delayed(Duration::from_secs(7)));
    provider.push_live(Canned::live(11.05, 77.05, 30.0));
    let geolocation = Arc::new(MockGeolocation::new());

    let config = Config { stale_polls: StalePolls::Discard, ..Config::default() };
    let view = TrackingView::mount(
        "7",
        Arc::clone(&provider),
        Arc::clone(&geolocation),
        config,
    )
    .await;

    wait_until(&view, |s| s.vehicle.is_some()).await;

    // past the late answer, before the next tick
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(provider.live_requests(), 2);

    let vehicle = view.snapshot().vehicle.expect("vehicle fix");
    assert_eq!(vehicle.position, Position::new(11.05, 77.05));

    view.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn stale_polls_last_writer_wins() {
    let provider = Arc::new(MockProvider::new());
    provider.push_live(Canned::live(11.01, 77.01, 30.0).delayed(Duration::from_secs(7)));
    provider.push_live(Canned::live(11.05, 77.05, 30.0));
    let geolocation = Arc::new(MockGeolocation::new());

    let view = mount(&provider, &geolocation).await;

    wait_until(&view, |s| s.vehicle.is_some()).await;
    let snapshot = wait_until(&view, |s| {
        s.vehicle.is_some_and(|v| v.position == Position::new(11.01, 77.01))
    })
    .await;
    assert_eq!(snapshot.vehicle.map(|v| v.position), Some(Position::new(11.01, 77.01)));

    view.unmount().await;
}
