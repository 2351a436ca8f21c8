pub use shared::{
    ActiveNavigation, ApiError, FixResponse, GeoPoint, GpsFix, NavigationState, Route, RouteQuery,
    StartSessionRequest, Step, TrafficUpdate,
};

use serde::Serialize;

use crate::error::RouteValidationError;

/// Projection of a fix onto the route polyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnapResult {
    /// Start vertex of the segment holding `closest_point`.
    pub closest_point_index: usize,
    pub closest_point: GeoPoint,
    pub distance_to_route_m: f64,
}

/// Checks the invariants a route must satisfy before a session can run on it.
pub fn validate_route(route: &Route) -> Result<(), RouteValidationError> {
    if route.points.is_empty() {
        return Err(RouteValidationError::NoPoints);
    }
    if let Some(bad) = route
        .points
        .iter()
        .position(|p| !p.lat.is_finite() || !p.lon.is_finite())
    {
        return Err(RouteValidationError::InvalidPoint(bad));
    }
    if route.steps.is_empty() {
        return Err(RouteValidationError::NoSteps);
    }
    if let Some(bad) = route
        .steps
        .iter()
        .position(|s| !s.distance_m.is_finite() || s.distance_m < 0.0)
    {
        return Err(RouteValidationError::InvalidStepDistance(bad));
    }
    let totals_ok = route.total_distance_m.is_finite()
        && route.total_distance_m >= 0.0
        && route.total_duration_s.is_finite()
        && route.total_duration_s >= 0.0;
    if !totals_ok {
        return Err(RouteValidationError::InvalidTotals);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Route {
        Route {
            points: vec![GeoPoint::new(45.0, 5.0), GeoPoint::new(45.0, 5.01)],
            steps: vec![Step {
                instruction: "Arrive at destination".into(),
                distance_m: 788.0,
            }],
            total_distance_m: 788.0,
            total_duration_s: 60.0,
        }
    }

    #[test]
    fn accepts_well_formed_route() {
        assert!(validate_route(&route()).is_ok());
    }

    #[test]
    fn rejects_route_without_points() {
        let mut r = route();
        r.points.clear();
        assert!(matches!(validate_route(&r), Err(RouteValidationError::NoPoints)));
    }

    #[test]
    fn rejects_route_without_steps() {
        let mut r = route();
        r.steps.clear();
        assert!(matches!(validate_route(&r), Err(RouteValidationError::NoSteps)));
    }

    #[test]
    fn rejects_negative_step_distance() {
        let mut r = route();
        r.steps.push(Step {
            instruction: "Turn left".into(),
            distance_m: -1.0,
        });
        assert!(matches!(
            validate_route(&r),
            Err(RouteValidationError::InvalidStepDistance(1))
        ));
    }

    #[test]
    fn rejects_nan_totals() {
        let mut r = route();
        r.total_duration_s = f64::NAN;
        assert!(matches!(validate_route(&r), Err(RouteValidationError::InvalidTotals)));
    }

    #[test]
    fn zero_length_route_is_valid() {
        let mut r = route();
        r.points.truncate(1);
        r.total_distance_m = 0.0;
        r.total_duration_s = 0.0;
        assert!(validate_route(&r).is_ok());
    }
}
