//! Great-circle geometry on a spherical Earth.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for all distances, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS-84 point, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Haversine distance to `other`, in kilometres.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Haversine distance to `other`, in metres.
    #[must_use]
    pub fn distance_m(&self, other: &Self) -> f64 {
        self.distance_km(other) * 1000.0
    }

    /// Finite and within the latitude/longitude ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Parses `"lat,lon"`.
impl FromStr for Position {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (lat, lon) =
            s.split_once(',').ok_or_else(|| anyhow!("expected `lat,lon`, got `{s}`"))?;
        let latitude = lat.trim().parse::<f64>().context("parsing latitude")?;
        let longitude = lon.trim().parse::<f64>().context("parsing longitude")?;

        let position = Self { latitude, longitude };
        if !position.is_valid() {
            return Err(anyhow!("position out of range: {position}"));
        }
        Ok(position)
    }
}

/// Great-circle distance between two points given in degrees, in kilometres.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}
