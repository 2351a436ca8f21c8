use crate::distance::distance_along;
use crate::models::{Route, SnapResult};

/// The step being executed and how far away its maneuver point is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPosition {
    pub step_index: usize,
    pub distance_to_maneuver_m: f64,
}

/// Locates the current step from the along-route distance of a snap.
pub fn detect_step(snap: &SnapResult, route: &Route) -> StepPosition {
    let along = distance_along(snap, &route.points);
    step_at(route, along)
}

/// Step whose span `[start, end]` contains `along`; past the last span the
/// last step is returned with zero distance.
pub fn step_at(route: &Route, along: f64) -> StepPosition {
    let mut cumulative = 0.0;
    for (step_index, step) in route.steps.iter().enumerate() {
        cumulative += step.distance_m;
        if along <= cumulative {
            return StepPosition {
                step_index,
                distance_to_maneuver_m: cumulative - along,
            };
        }
    }
    StepPosition {
        step_index: route.steps.len().saturating_sub(1),
        distance_to_maneuver_m: 0.0,
    }
}

/// Distance from `along` to the maneuver point of `step_index`, never negative.
pub fn distance_to_maneuver(route: &Route, step_index: usize, along: f64) -> f64 {
    let end: f64 = route
        .steps
        .iter()
        .take(step_index + 1)
        .map(|step| step.distance_m)
        .sum();
    (end - along).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, Step};

    fn route() -> Route {
        let steps = [("Head east", 100.0), ("Turn left", 250.0), ("Arrive", 150.0)]
            .into_iter()
            .map(|(instruction, distance_m)| Step {
                instruction: instruction.into(),
                distance_m,
            })
            .collect();
        Route {
            points: vec![GeoPoint::new(45.0, 5.0), GeoPoint::new(45.0, 5.01)],
            steps,
            total_distance_m: 500.0,
            total_duration_s: 60.0,
        }
    }

    #[test]
    fn first_step_at_route_start() {
        let position = step_at(&route(), 0.0);
        assert_eq!(position.step_index, 0);
        assert_eq!(position.distance_to_maneuver_m, 100.0);
    }

    #[test]
    fn second_step_in_its_span() {
        let position = step_at(&route(), 180.0);
        assert_eq!(position.step_index, 1);
        assert_eq!(position.distance_to_maneuver_m, 170.0);
    }

    #[test]
    fn maneuver_point_belongs_to_its_step() {
        let position = step_at(&route(), 100.0);
        assert_eq!(position.step_index, 0);
        assert_eq!(position.distance_to_maneuver_m, 0.0);
    }

    #[test]
    fn past_last_step_clamps_to_final_step() {
        let position = step_at(&route(), 900.0);
        assert_eq!(position.step_index, 2);
        assert_eq!(position.distance_to_maneuver_m, 0.0);
    }

    #[test]
    fn detect_step_uses_snapped_position() {
        let r = route();
        let snap = SnapResult {
            closest_point_index: 0,
            closest_point: r.points[0],
            distance_to_route_m: 0.0,
        };
        assert_eq!(detect_step(&snap, &r).step_index, 0);
    }

    #[test]
    fn distance_to_maneuver_for_forced_step() {
        let r = route();
        assert_eq!(distance_to_maneuver(&r, 1, 90.0), 260.0);
        assert_eq!(distance_to_maneuver(&r, 0, 120.0), 0.0);
        assert_eq!(distance_to_maneuver(&r, 7, 0.0), 500.0);
    }
}
