use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }
}

/// One maneuver of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub instruction: String,
    /// Distance from the start of this step to its maneuver point.
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub points: Vec<GeoPoint>,
    pub steps: Vec<Step>,
    pub total_distance_m: f64,
    pub total_duration_s: f64,
}

impl Route {
    /// Final point of the polyline.
    pub fn destination(&self) -> Option<GeoPoint> {
        self.points.last().copied()
    }
}

/// A single GPS sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub speed_mps: f64,
    pub timestamp: DateTime<Utc>,
}

impl GpsFix {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps * 3.6
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveNavigation {
    pub route: Arc<Route>,
    pub destination_name: String,
    pub current_step_index: usize,
    pub current_step: Step,
    pub distance_to_next_maneuver_m: f64,
    pub remaining_distance_m: f64,
    pub estimated_time_remaining_s: f64,
    pub is_off_route: bool,
    pub closest_point_index: usize,
    pub distance_to_route_m: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NavigationState {
    #[default]
    Idle,
    Active(ActiveNavigation),
    Arrived { destination_name: String },
}

impl NavigationState {
    pub fn as_active(&self) -> Option<&ActiveNavigation> {
        match self {
            NavigationState::Active(active) => Some(active),
            NavigationState::Idle | NavigationState::Arrived { .. } => None,
        }
    }

    pub fn is_arrived(&self) -> bool {
        matches!(self, NavigationState::Arrived { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub route: Route,
    pub destination_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteQuery {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    #[serde(default)]
    pub avoid_traffic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixResponse {
    pub state: NavigationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announcement: Option<String>,
    pub recalculating: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrafficUpdate {
    pub factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}
