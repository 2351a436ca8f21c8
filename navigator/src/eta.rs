use serde::{Deserialize, Serialize};

pub const MIN_TRAFFIC_FACTOR: f64 = 0.5;
pub const MAX_TRAFFIC_FACTOR: f64 = 3.0;

/// Multiplier applied to the proportional ETA, always within
/// [`MIN_TRAFFIC_FACTOR`, `MAX_TRAFFIC_FACTOR`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct TrafficFactor(f64);

impl TrafficFactor {
    pub const NEUTRAL: Self = Self(1.0);

    /// Clamps `factor` into range; NaN becomes neutral.
    pub fn new(factor: f64) -> Self {
        if factor.is_nan() {
            return Self::NEUTRAL;
        }
        Self(factor.clamp(MIN_TRAFFIC_FACTOR, MAX_TRAFFIC_FACTOR))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for TrafficFactor {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl From<f64> for TrafficFactor {
    fn from(factor: f64) -> Self {
        Self::new(factor)
    }
}

impl From<TrafficFactor> for f64 {
    fn from(factor: TrafficFactor) -> Self {
        factor.0
    }
}

/// Proportional ETA: the share of the planned duration matching the share of
/// distance still ahead. Zero for a zero-length route.
pub fn remaining_time(remaining_distance: f64, total_distance: f64, total_duration: f64) -> f64 {
    if total_distance <= 0.0 {
        return 0.0;
    }
    total_duration * (remaining_distance / total_distance)
}

pub fn remaining_time_with_traffic(
    remaining_distance: f64,
    total_distance: f64,
    total_duration: f64,
    traffic_factor: impl Into<TrafficFactor>,
) -> f64 {
    remaining_time(remaining_distance, total_distance, total_duration)
        * traffic_factor.into().value()
}
