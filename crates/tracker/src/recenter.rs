//! Map viewport recentering.

use serde::Serialize;

use crate::config::Config;
use crate::geo::Position;
use crate::types::{UserFix, VehicleFix};

/// What the viewport is following.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CenterTarget {
    Vehicle,
    User,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Recenter {
    pub center: Position,
    pub target: CenterTarget,

    /// Whether the rider is beyond the "far" radius from the vehicle. Only
    /// known when both fixes are present; it does not change the centre.
    pub user_far: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: Position,
    pub zoom: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecenterPolicy {
    default_center: Position,
    far_user_km: f64,
}

impl RecenterPolicy {
    #[must_use]
    pub const fn new(config: &Config) -> Self {
        Self { default_center: config.default_center, far_user_km: config.far_user_km }
    }

    /// Vehicle first, then rider, then the fixed default.
    #[must_use]
    pub fn recenter(&self, user: Option<&UserFix>, vehicle: Option<&VehicleFix>) -> Recenter {
        match (vehicle, user) {
            (Some(vehicle), user) => {
                let user_far = user
                    .map(|user| user.position.distance_km(&vehicle.position) > self.far_user_km);

                // both branches follow the vehicle for now
                Recenter { center: vehicle.position, target: CenterTarget::Vehicle, user_far }
            }
            (None, Some(user)) => {
                Recenter { center: user.position, target: CenterTarget::User, user_far: None }
            }
            (None, None) => Recenter {
                center: self.default_center,
                target: CenterTarget::Default,
                user_far: None,
            },
        }
    }
}
