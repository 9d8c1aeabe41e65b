//! Nearest-stop and arrival estimation.
//!
//! Straight-line distances only, recomputed from scratch on every vehicle
//! poll. Consecutive estimates are not smoothed.

use crate::config::Config;
use crate::geo::Position;
use crate::types::{Estimate, EtaEstimate, RouteStopList, Stop, UserFix, VehicleFix};

/// Stop closest to `position`, with its distance in kilometres. Ties go to
/// the stop that comes first in route order.
#[must_use]
pub fn nearest_stop<'a>(position: &Position, stops: &'a [Stop]) -> Option<(&'a Stop, f64)> {
    let mut nearest: Option<(&Stop, f64)> = None;
    for stop in stops {
        let distance = position.distance_km(&stop.position());
        // strict comparison keeps the first of equal stops and skips NaN
        if nearest.is_none_or(|(_, min)| distance < min) && distance.is_finite() {
            nearest = Some((stop, distance));
        }
    }
    nearest
}

/// Reported speed when positive, otherwise `default_kmh`.
#[must_use]
pub fn effective_speed(speed_kmh: f64, default_kmh: f64) -> f64 {
    if speed_kmh.is_finite() && speed_kmh > 0.0 { speed_kmh } else { default_kmh }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calculator {
    max_stop_distance_km: f64,
    default_speed_kmh: f64,
}

impl Calculator {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        // a zero default would divide by zero
        let default_speed_kmh =
            if config.default_speed_kmh > 0.0 { config.default_speed_kmh } else { 30.0 };
        Self { max_stop_distance_km: config.max_stop_distance_km, default_speed_kmh }
    }

    /// Estimates when the vehicle reaches the rider's nearest stop.
    ///
    /// Returns `None` when the route has no usable stops.
    #[must_use]
    pub fn estimate(
        &self, user: &UserFix, vehicle: &VehicleFix, route: &RouteStopList,
    ) -> Option<Estimate> {
        let (stop, min_distance) = nearest_stop(&user.position, route.stops())?;

        if min_distance >= self.max_stop_distance_km {
            return Some(Estimate::OutOfRange { distance_km: min_distance });
        }

        let distance_km = vehicle.position.distance_km(&stop.position());
        let speed_kmh = effective_speed(vehicle.speed_kmh, self.default_speed_kmh);
        let minutes = distance_km / speed_kmh * 60.0;

        Some(Estimate::Arrival(EtaEstimate { stop: stop.clone(), minutes, distance_km, speed_kmh }))
    }
}
