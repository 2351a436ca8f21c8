use crate::models::{GeoPoint, SnapResult};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn direct_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

pub fn polyline_length(points: &[GeoPoint]) -> f64 {
    points.windows(2).map(|w| direct_distance(w[0], w[1])).sum()
}

/// Along-route distance from the snapped position to the end of the route.
///
/// The partial segment from the snap to the far endpoint of its segment, plus
/// every segment after it.
pub fn remaining_distance(snap: &SnapResult, points: &[GeoPoint]) -> f64 {
    let next = snap.closest_point_index + 1;
    if next >= points.len() {
        return 0.0;
    }
    direct_distance(snap.closest_point, points[next]) + polyline_length(&points[next..])
}

/// Along-route distance from the first route point to the snapped position.
pub fn distance_along(snap: &SnapResult, points: &[GeoPoint]) -> f64 {
    let index = snap.closest_point_index.min(points.len().saturating_sub(1));
    if points.is_empty() {
        return 0.0;
    }
    polyline_length(&points[..=index]) + direct_distance(points[index], snap.closest_point)
}
