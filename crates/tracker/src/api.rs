//! Backend client for the resources the tracking view consumes.

use anyhow::Context;
use bytes::Bytes;
use chrono::Utc;
use http::header::{ACCEPT, CACHE_CONTROL};
use http::{Method, StatusCode};
use realtime::{Error, HttpRequest, bad_gateway, not_found};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{Bus, LiveReading, RouteStop, RouteStopList, VehicleFix};
use crate::{Provider, Result};

/// Retrieves a bus by id. A `null` body means the bus is unknown.
///
/// # Errors
///
/// Returns an error when the backend request fails or the response cannot be
/// deserialized.
pub async fn bus(bus_id: &str, provider: &impl Provider) -> Result<Option<Bus>> {
    let path = format!("/buses/{}", urlencoding::encode(bus_id));
    get_json(provider, &path).await.context("fetching bus").map_err(Error::from)
}

/// Retrieves the stops of a route in `stop_order`.
///
/// # Errors
///
/// Returns an error when the backend request fails or the response cannot be
/// deserialized.
pub async fn route_stops(route_id: &str, provider: &impl Provider) -> Result<RouteStopList> {
    let path = format!("/routes/{}/stops", urlencoding::encode(route_id));
    let rows: Option<Vec<RouteStop>> =
        get_json(provider, &path).await.context("fetching route stops")?;
    Ok(RouteStopList::from_route_stops(rows.unwrap_or_default()))
}

/// Resolves the ordered stops of the route `bus_id` is assigned to. A bus
/// without a route has no stops.
///
/// # Errors
///
/// Returns an error when the bus is unknown or either request fails.
pub async fn load_route(bus_id: &str, provider: &impl Provider) -> Result<RouteStopList> {
    let Some(bus) = bus(bus_id, provider).await? else {
        return Err(not_found!("bus {bus_id}"));
    };
    let Some(route_id) = bus.route_id else {
        debug!(bus_id = %bus_id, "bus has no route assigned");
        return Ok(RouteStopList::default());
    };

    route_stops(&route_id, provider).await
}

/// Retrieves the last reported position of a bus, or `None` when it has never
/// reported.
///
/// # Errors
///
/// Returns an error when the backend request fails or the response is
/// malformed.
pub async fn live_position(bus_id: &str, provider: &impl Provider) -> Result<Option<VehicleFix>> {
    let path = format!("/bus/live?busId={}", urlencoding::encode(bus_id));
    let reading = match get_json::<Option<LiveReading>>(provider, &path).await {
        Ok(reading) => reading,
        Err(Error::NoData) => None,
        Err(e) => Err::<Option<LiveReading>, _>(e).context("fetching live position")?,
    };
    Ok(reading.and_then(|reading| reading.into_fix(Utc::now())))
}

async fn get_json<T>(provider: &impl Provider, path: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let base_url =
        realtime::Config::get(provider, "API_BASE_URL").await.context("getting `API_BASE_URL`")?;
    let uri = format!("{}{path}", base_url.trim_end_matches('/'));

    let request = http::Request::builder()
        .method(Method::GET)
        .uri(&uri)
        .header(ACCEPT, "application/json")
        .header(CACHE_CONTROL, "no-cache")
        .body(Bytes::new())
        .context("building backend request")?;

    let response = HttpRequest::fetch(provider, request)
        .await
        .map_err(|e| bad_gateway!("request to {uri} failed: {e}"))?;

    match response.status() {
        status if status.is_success() => {}
        StatusCode::NOT_FOUND => return Err(not_found!("{uri}")),
        status => return Err(bad_gateway!("{uri} returned {status}")),
    }

    let body = response.into_body();
    if body.is_empty() {
        return Err(Error::NoData);
    }
    Ok(serde_json::from_slice(&body)?)
}
