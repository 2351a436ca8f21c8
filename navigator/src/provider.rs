use async_trait::async_trait;

use crate::distance::{direct_distance, polyline_length};
use crate::error::NavigationError;
use crate::models::{GeoPoint, Route, RouteQuery, Step};

/// Source of routes for recalculation.
///
/// Abstracts the routing backend so the session can be driven by:
/// - **Production**: a remote routing service over HTTP
/// - **Offline**: a straight-line route to the destination
/// - **Testing**: canned or failing providers
///
/// # Contract
/// - Return `None` when no route can be produced; the caller keeps its
///   current route.
/// - A returned route ends at (or next to) `destination`.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn get_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        avoid_traffic: bool,
    ) -> Option<Route>;
}

/// Remote routing service speaking JSON.
///
/// Posts a [`RouteQuery`] to `{base_url}/api/navigation/route` and expects a
/// [`Route`] back.
#[derive(Clone)]
pub struct HttpRoutingProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRoutingProvider {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/navigation/route", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, query: &RouteQuery) -> Result<Route, NavigationError> {
        let route = self
            .client
            .post(&self.endpoint)
            .json(query)
            .send()
            .await?
            .error_for_status()?
            .json::<Route>()
            .await?;
        Ok(route)
    }
}

#[async_trait]
impl RoutingProvider for HttpRoutingProvider {
    async fn get_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        avoid_traffic: bool,
    ) -> Option<Route> {
        let query = RouteQuery {
            origin,
            destination,
            avoid_traffic,
        };
        match self.request(&query).await {
            Ok(route) => {
                tracing::debug!(
                    "routing service returned {} points, {} steps",
                    route.points.len(),
                    route.steps.len()
                );
                Some(route)
            }
            Err(err) => {
                tracing::warn!("routing service at {} failed: {err}", self.endpoint);
                None
            }
        }
    }
}

/// Straight route from origin to destination, densified every
/// `spacing_m` meters, with a single arrival step.
#[derive(Debug, Clone, Copy)]
pub struct DirectRouteProvider {
    pub spacing_m: f64,
    pub speed_mps: f64,
}

impl Default for DirectRouteProvider {
    fn default() -> Self {
        Self {
            spacing_m: 25.0,
            speed_mps: 50.0 / 3.6,
        }
    }
}

impl DirectRouteProvider {
    pub fn build_route(&self, origin: GeoPoint, destination: GeoPoint) -> Route {
        let length = direct_distance(origin, destination);
        let segments = (length / self.spacing_m.max(1.0)).ceil().max(1.0) as usize;

        let points: Vec<GeoPoint> = (0..=segments)
            .map(|i| {
                if i == segments {
                    destination
                } else {
                    origin.interpolate(destination, i as f64 / segments as f64)
                }
            })
            .collect();
        let total_distance_m = polyline_length(&points);
        let total_duration_s = if self.speed_mps > 0.0 {
            total_distance_m / self.speed_mps
        } else {
            0.0
        };

        Route {
            points,
            steps: vec![Step {
                instruction: "Arrive at your destination".into(),
                distance_m: total_distance_m,
            }],
            total_distance_m,
            total_duration_s,
        }
    }
}

#[async_trait]
impl RoutingProvider for DirectRouteProvider {
    async fn get_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        _avoid_traffic: bool,
    ) -> Option<Route> {
        Some(self.build_route(origin, destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::validate_route;

    #[test]
    fn direct_route_ends_at_destination() {
        let origin = GeoPoint::new(45.0, 5.0);
        let destination = GeoPoint::new(45.01, 5.01);
        let route = DirectRouteProvider::default().build_route(origin, destination);

        assert_eq!(route.points.first().copied(), Some(origin));
        assert_eq!(route.destination(), Some(destination));
        assert!(validate_route(&route).is_ok());
        assert!(route.points.len() > 10);
        let spacing = direct_distance(route.points[0], route.points[1]);
        assert!(spacing <= 25.0 + 1e-6, "spacing {spacing}");
    }

    #[test]
    fn direct_route_duration_follows_speed() {
        let provider = DirectRouteProvider {
            spacing_m: 50.0,
            speed_mps: 10.0,
        };
        let route = provider.build_route(GeoPoint::new(45.0, 5.0), GeoPoint::new(45.009, 5.0));
        assert!((route.total_duration_s - route.total_distance_m / 10.0).abs() < 1e-9);
        assert_eq!(route.steps.len(), 1);
        assert_eq!(route.steps[0].distance_m, route.total_distance_m);
    }

    #[test]
    fn direct_route_for_identical_points() {
        let p = GeoPoint::new(45.0, 5.0);
        let route = DirectRouteProvider::default().build_route(p, p);
        assert_eq!(route.points, vec![p, p]);
        assert_eq!(route.total_distance_m, 0.0);
    }

    #[tokio::test]
    async fn unreachable_service_yields_none() {
        let provider = HttpRoutingProvider::new("http://127.0.0.1:9/");
        assert_eq!(provider.endpoint(), "http://127.0.0.1:9/api/navigation/route");
        let route = provider
            .get_route(GeoPoint::new(45.0, 5.0), GeoPoint::new(45.1, 5.1), true)
            .await;
        assert!(route.is_none());
    }
}
