use crate::config::{ArrivalMode, NavigationConfig};
use crate::distance::direct_distance;
use crate::models::{ActiveNavigation, GpsFix};

pub const ARRIVAL_DIRECT_M: f64 = 30.0;
pub const ARRIVAL_ROUTE_M: f64 = 50.0;

/// Decides when the traveler has reached the destination.
///
/// Straight-line distance underestimates the remaining way in dense streets
/// and car parks, while route distance overestimates it when the polyline
/// overshoots the destination; in `Dual` mode either one is enough.
#[derive(Debug, Clone, Copy)]
pub struct CheckArrival {
    mode: ArrivalMode,
    direct_threshold_m: f64,
    route_threshold_m: f64,
}

impl Default for CheckArrival {
    fn default() -> Self {
        Self {
            mode: ArrivalMode::Dual,
            direct_threshold_m: ARRIVAL_DIRECT_M,
            route_threshold_m: ARRIVAL_ROUTE_M,
        }
    }
}

impl CheckArrival {
    pub fn direct_only() -> Self {
        Self {
            mode: ArrivalMode::DirectOnly,
            ..Self::default()
        }
    }

    pub fn from_config(config: &NavigationConfig) -> Self {
        Self {
            mode: config.arrival_mode,
            direct_threshold_m: config.arrival_direct_m,
            route_threshold_m: config.arrival_route_m,
        }
    }

    pub fn has_arrived(&self, fix: &GpsFix, active: &ActiveNavigation) -> bool {
        let Some(destination) = active.route.destination() else {
            return false;
        };
        let direct = direct_distance(fix.position(), destination);
        if direct < self.direct_threshold_m {
            tracing::debug!("arrival by direct distance ({direct:.1} m)");
            return true;
        }
        match self.mode {
            ArrivalMode::Dual if active.remaining_distance_m < self.route_threshold_m => {
                tracing::debug!(
                    "arrival by route distance ({:.1} m remaining, {direct:.1} m direct)",
                    active.remaining_distance_m
                );
                true
            }
            ArrivalMode::Dual | ArrivalMode::DirectOnly => false,
        }
    }
}
