use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{GpsFix, SnapResult};

pub const DEFAULT_CONFIRMATION_SECS: i64 = 3;

/// Tolerated distance from the route for a given speed.
///
/// Tight in town and car parks, loose on highways where lane offset and
/// multipath error grow.
pub fn dynamic_threshold(speed_kmh: f64) -> f64 {
    if speed_kmh < 40.0 {
        30.0
    } else if speed_kmh < 80.0 {
        50.0
    } else {
        80.0
    }
}

/// Off-route state machine: on route, pending (first exceedance seen) and
/// confirmed once the exceedance has lasted `confirmation_delay`.
///
/// Elapsed time is measured between fix timestamps.
#[derive(Debug, Clone)]
pub struct OffRouteDetector {
    confirmation_delay: TimeDelta,
    first_detected_at: Option<DateTime<Utc>>,
}

impl Default for OffRouteDetector {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(DEFAULT_CONFIRMATION_SECS))
    }
}

impl OffRouteDetector {
    pub fn new(confirmation_delay: TimeDelta) -> Self {
        Self {
            confirmation_delay,
            first_detected_at: None,
        }
    }

    pub fn check_off_route(&mut self, fix: &GpsFix, snap: &SnapResult) -> bool {
        let threshold = dynamic_threshold(fix.speed_kmh());
        if snap.distance_to_route_m <= threshold {
            if self.first_detected_at.take().is_some() {
                tracing::debug!(
                    "back within {threshold} m of the route ({:.1} m), off-route pending state cleared",
                    snap.distance_to_route_m
                );
            }
            return false;
        }

        match self.first_detected_at {
            None => {
                tracing::debug!(
                    "fix {:.1} m from route exceeds {threshold} m, starting grace period",
                    snap.distance_to_route_m
                );
                self.first_detected_at = Some(fix.timestamp);
                false
            }
            Some(since) => fix.timestamp - since >= self.confirmation_delay,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.first_detected_at.is_some()
    }

    pub fn reset(&mut self) {
        self.first_detected_at = None;
    }
}
