use std::sync::Arc;

use crate::distance::direct_distance;
use crate::eta::{TrafficFactor, remaining_time_with_traffic};
use crate::models::{ActiveNavigation, GeoPoint, NavigationState, Route, Step, validate_route};
use crate::provider::RoutingProvider;
use crate::session::NavigationDetectors;

/// Fresh `Active` value at step 0 of `route`, with distances and ETA taken
/// from the route totals.
pub fn seed_state(
    route: Arc<Route>,
    destination_name: impl Into<String>,
    position: GeoPoint,
    traffic: TrafficFactor,
) -> ActiveNavigation {
    let first_step = route.steps.first().cloned().unwrap_or_else(|| Step {
        instruction: String::new(),
        distance_m: 0.0,
    });
    let distance_to_route_m = route
        .points
        .first()
        .map(|start| direct_distance(position, *start))
        .unwrap_or(0.0);

    ActiveNavigation {
        destination_name: destination_name.into(),
        current_step_index: 0,
        distance_to_next_maneuver_m: first_step.distance_m,
        current_step: first_step,
        remaining_distance_m: route.total_distance_m,
        estimated_time_remaining_s: remaining_time_with_traffic(
            route.total_distance_m,
            route.total_distance_m,
            route.total_duration_s,
            traffic,
        ),
        is_off_route: false,
        closest_point_index: 0,
        distance_to_route_m,
        route,
    }
}

/// Replaces the active route with a traffic-avoiding one from the provider.
///
/// Split in two halves so the network call can run while fixes keep being
/// processed on the old route: [`RecalculateRoute::fetch`] talks to the
/// provider, [`RecalculateRoute::apply`] swaps the route in and resets the
/// detectors.
#[derive(Clone)]
pub struct RecalculateRoute {
    provider: Arc<dyn RoutingProvider>,
}

impl RecalculateRoute {
    pub fn new(provider: Arc<dyn RoutingProvider>) -> Self {
        Self { provider }
    }

    /// Asks the provider for a route from `origin` to `destination`.
    /// Routes that fail validation count as failures.
    pub async fn fetch(&self, origin: GeoPoint, destination: GeoPoint) -> Option<Route> {
        let Some(route) = self.provider.get_route(origin, destination, true).await else {
            tracing::warn!("route recalculation failed: provider returned no route");
            return None;
        };
        if let Err(err) = validate_route(&route) {
            tracing::warn!("route recalculation failed: provider returned an invalid route: {err}");
            return None;
        }
        tracing::info!(
            "recalculated route: {:.0} m, {:.0} s, {} steps",
            route.total_distance_m,
            route.total_duration_s,
            route.steps.len()
        );
        Some(route)
    }

    pub fn apply(
        route: Route,
        destination_name: impl Into<String>,
        position: GeoPoint,
        detectors: &mut NavigationDetectors,
        traffic: TrafficFactor,
    ) -> NavigationState {
        detectors.reset();
        NavigationState::Active(seed_state(Arc::new(route), destination_name, position, traffic))
    }

    /// Fetch and apply in one go. `None` leaves the caller's state as it was.
    pub async fn execute(
        &self,
        active: &ActiveNavigation,
        position: GeoPoint,
        detectors: &mut NavigationDetectors,
        traffic: TrafficFactor,
    ) -> Option<NavigationState> {
        let destination = active.route.destination()?;
        let route = self.fetch(position, destination).await?;
        Some(Self::apply(
            route,
            active.destination_name.clone(),
            position,
            detectors,
            traffic,
        ))
    }
}
