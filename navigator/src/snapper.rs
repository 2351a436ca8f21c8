use std::ops::Range;

use crate::distance::direct_distance;
use crate::models::{GeoPoint, SnapResult};

pub const DEFAULT_SEARCH_RADIUS: usize = 50;

/// Projects fixes onto a route polyline.
///
/// Candidates are segments: each fix is projected onto a segment with a
/// latitude-scaled planar approximation, and the fix-to-projection distance is
/// measured with haversine so it agrees with [`crate::distance`].
#[derive(Debug, Clone, Copy)]
pub struct RouteSnapper {
    search_radius: usize,
}

impl Default for RouteSnapper {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_RADIUS)
    }
}

impl RouteSnapper {
    pub fn new(search_radius: usize) -> Self {
        Self { search_radius }
    }

    pub fn search_radius(&self) -> usize {
        self.search_radius
    }

    /// Windowed search around `last_known_index` when one is known, full
    /// search otherwise or when the window yields nothing.
    ///
    /// # Panics
    /// Panics if `points` is empty. Routes are validated at session start.
    pub fn snap(
        &self,
        position: GeoPoint,
        points: &[GeoPoint],
        last_known_index: Option<usize>,
    ) -> SnapResult {
        if let Some(last) = last_known_index.filter(|&idx| idx > 0) {
            if let Some(snap) = self.snap_windowed(position, points, last) {
                return snap;
            }
            tracing::debug!(
                "windowed snap around index {last} found no candidate on {} points, falling back to full search",
                points.len()
            );
        }
        Self::snap_full(position, points)
    }

    /// # Panics
    /// Panics if `points` is empty.
    pub fn snap_full(position: GeoPoint, points: &[GeoPoint]) -> SnapResult {
        assert!(!points.is_empty(), "cannot snap onto an empty route");
        // a single-point route has no segment
        nearest_on_segments(position, points, 0..points.len() - 1).unwrap_or_else(|| SnapResult {
            closest_point_index: 0,
            closest_point: points[0],
            distance_to_route_m: direct_distance(position, points[0]),
        })
    }

    /// Scans vertices in `[last - radius, last + radius]`. `None` when the
    /// window holds no segment, e.g. `last_known_index` is out of bounds.
    pub fn snap_windowed(
        &self,
        position: GeoPoint,
        points: &[GeoPoint],
        last_known_index: usize,
    ) -> Option<SnapResult> {
        if last_known_index >= points.len() {
            return None;
        }
        let lo = last_known_index.saturating_sub(self.search_radius);
        let hi = last_known_index
            .saturating_add(self.search_radius)
            .min(points.len() - 1);
        nearest_on_segments(position, points, lo..hi)
    }
}

/// Best projection over the segments starting at the indices in `segments`.
fn nearest_on_segments(
    position: GeoPoint,
    points: &[GeoPoint],
    segments: Range<usize>,
) -> Option<SnapResult> {
    let mut best: Option<SnapResult> = None;

    for i in segments {
        let a = points[i];
        let b = points[i + 1];
        let (projected, t) = project_on_segment(position, a, b);
        let distance = direct_distance(position, projected);

        let is_better = match &best {
            Some(prev) => distance < prev.distance_to_route_m,
            None => true,
        };
        if is_better {
            // The far end of a segment belongs to the next vertex.
            let closest_point_index = if t >= 1.0 { i + 1 } else { i };
            best = Some(SnapResult {
                closest_point_index,
                closest_point: projected,
                distance_to_route_m: distance,
            });
        }
    }

    best
}

/// Returns the projected point and the clamped segment parameter.
fn project_on_segment(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> (GeoPoint, f64) {
    let cos_lat = ((a.lat + b.lat) / 2.0).to_radians().cos();

    let dx = (b.lon - a.lon) * cos_lat;
    let dy = b.lat - a.lat;
    let px = (p.lon - a.lon) * cos_lat;
    let py = p.lat - a.lat;

    let seg_len_sq = dx * dx + dy * dy;
    if seg_len_sq < 1e-20 {
        return (a, 0.0);
    }

    let t = ((px * dx + py * dy) / seg_len_sq).clamp(0.0, 1.0);
    let projected = if t <= 0.0 {
        a
    } else if t >= 1.0 {
        b
    } else {
        a.interpolate(b, t)
    };
    (projected, t)
}
