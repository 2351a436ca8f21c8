use std::{fs::File, io::Read, path::Path};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::NavigationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalMode {
    /// Direct distance or remaining route distance.
    Dual,
    /// Direct distance only, for open destinations such as car parks.
    DirectOnly,
}

/// Tunables of a navigation session. Every field has a default, so an empty
/// JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub snap_search_radius: usize,
    pub off_route_confirmation_secs: f64,
    pub step_advance_distance_m: f64,
    pub arrival_direct_m: f64,
    pub arrival_route_m: f64,
    pub arrival_mode: ArrivalMode,
    /// Periodic traffic-aware refresh; `None` disables it.
    pub recalculation_interval_secs: Option<f64>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            snap_search_radius: crate::snapper::DEFAULT_SEARCH_RADIUS,
            off_route_confirmation_secs: crate::off_route::DEFAULT_CONFIRMATION_SECS as f64,
            step_advance_distance_m: 20.0,
            arrival_direct_m: 30.0,
            arrival_route_m: 50.0,
            arrival_mode: ArrivalMode::Dual,
            recalculation_interval_secs: Some(30.0),
        }
    }
}

impl NavigationConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NavigationError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, NavigationError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Reads the file named by `NAV_CONFIG`, defaults when unset.
    pub fn from_env() -> Result<Self, NavigationError> {
        match std::env::var("NAV_CONFIG") {
            Ok(path) => {
                tracing::info!("loading navigation config from {path}");
                Self::from_file(path)
            }
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn off_route_confirmation(&self) -> TimeDelta {
        secs_to_delta(self.off_route_confirmation_secs)
    }

    pub fn recalculation_interval(&self) -> Option<TimeDelta> {
        self.recalculation_interval_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(secs_to_delta)
    }
}

fn secs_to_delta(secs: f64) -> TimeDelta {
    TimeDelta::milliseconds((secs.max(0.0) * 1000.0).round() as i64)
}
