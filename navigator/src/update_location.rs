use crate::config::NavigationConfig;
use crate::distance::{distance_along, remaining_distance};
use crate::eta::{TrafficFactor, remaining_time_with_traffic};
use crate::models::{ActiveNavigation, GpsFix, NavigationState};
use crate::off_route::OffRouteDetector;
use crate::snapper::RouteSnapper;
use crate::steps::{distance_to_maneuver, step_at};

pub const STEP_ADVANCE_DISTANCE_M: f64 = 20.0;

/// Turns the previous state and one fix into the next state.
///
/// The previous state is never modified; the only mutable input is the
/// off-route detector, which belongs to the session.
#[derive(Debug, Clone, Copy)]
pub struct UpdateLocation {
    snapper: RouteSnapper,
    step_advance_distance_m: f64,
}

impl Default for UpdateLocation {
    fn default() -> Self {
        Self::new(RouteSnapper::default(), STEP_ADVANCE_DISTANCE_M)
    }
}

impl UpdateLocation {
    pub fn new(snapper: RouteSnapper, step_advance_distance_m: f64) -> Self {
        Self {
            snapper,
            step_advance_distance_m,
        }
    }

    pub fn from_config(config: &NavigationConfig) -> Self {
        Self::new(
            RouteSnapper::new(config.snap_search_radius),
            config.step_advance_distance_m,
        )
    }

    /// `Idle` and `Arrived` pass through unchanged.
    pub fn execute(
        &self,
        state: &NavigationState,
        fix: &GpsFix,
        off_route: &mut OffRouteDetector,
        traffic: TrafficFactor,
    ) -> NavigationState {
        match state {
            NavigationState::Active(active) => {
                NavigationState::Active(self.update_active(active, fix, off_route, traffic))
            }
            NavigationState::Idle | NavigationState::Arrived { .. } => state.clone(),
        }
    }

    /// True when the maneuver is close and another step follows.
    pub fn should_advance_to_next_step(&self, state: &NavigationState) -> bool {
        state
            .as_active()
            .is_some_and(|active| self.should_advance(active))
    }

    fn should_advance(&self, active: &ActiveNavigation) -> bool {
        active.distance_to_next_maneuver_m < self.step_advance_distance_m
            && active.current_step_index + 1 < active.route.steps.len()
    }

    fn update_active(
        &self,
        active: &ActiveNavigation,
        fix: &GpsFix,
        off_route: &mut OffRouteDetector,
        traffic: TrafficFactor,
    ) -> ActiveNavigation {
        let route = &active.route;
        let last_known_index = Some(active.closest_point_index).filter(|&idx| idx > 0);
        let snap = self
            .snapper
            .snap(fix.position(), &route.points, last_known_index);

        let remaining = remaining_distance(&snap, &route.points);
        let eta = remaining_time_with_traffic(
            remaining,
            route.total_distance_m,
            route.total_duration_s,
            traffic,
        );

        // Steps never go back within one route, and a flagged advance moves
        // at least one step forward.
        let along = distance_along(&snap, &route.points);
        let detected = step_at(route, along);
        let floor = if self.should_advance(active) {
            active.current_step_index + 1
        } else {
            active.current_step_index
        };
        let last_step = route.steps.len().saturating_sub(1);
        let (step_index, distance_to_next_maneuver_m) = if detected.step_index >= floor {
            (detected.step_index, detected.distance_to_maneuver_m)
        } else {
            let index = floor.min(last_step);
            (index, distance_to_maneuver(route, index, along))
        };

        let is_off_route = off_route.check_off_route(fix, &snap);

        tracing::debug!(
            "fix ({:.6}, {:.6}) snapped to index {} at {:.1} m, remaining {:.0} m, eta {:.0} s, step {} in {:.0} m{}",
            fix.lat,
            fix.lon,
            snap.closest_point_index,
            snap.distance_to_route_m,
            remaining,
            eta,
            step_index,
            distance_to_next_maneuver_m,
            if is_off_route { ", OFF ROUTE" } else { "" }
        );

        ActiveNavigation {
            route: route.clone(),
            destination_name: active.destination_name.clone(),
            current_step_index: step_index,
            current_step: route.steps[step_index].clone(),
            distance_to_next_maneuver_m,
            remaining_distance_m: remaining,
            estimated_time_remaining_s: eta,
            is_off_route,
            closest_point_index: snap.closest_point_index,
            distance_to_route_m: snap.distance_to_route_m,
        }
    }
}
