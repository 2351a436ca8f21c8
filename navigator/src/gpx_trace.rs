use std::io::{Read, Write};

use chrono::{DateTime, TimeDelta, Utc};
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};

use crate::distance::direct_distance;
use crate::error::NavigationError;
use crate::models::{GeoPoint, GpsFix};

/// Reads every track point of a GPX document as a sequence of fixes, one per
/// `interval` starting at `start`.
pub fn read_fixes(
    reader: impl Read,
    start: DateTime<Utc>,
    interval: TimeDelta,
) -> Result<Vec<GpsFix>, NavigationError> {
    let gpx = gpx::read(reader)?;
    let waypoints: Vec<&Waypoint> = gpx
        .tracks
        .iter()
        .flat_map(|track| &track.segments)
        .flat_map(|segment| &segment.points)
        .collect();
    Ok(fixes_from_waypoints(&waypoints, start, interval))
}

/// Uses the recorded speed when the point carries one, otherwise the distance
/// covered since the previous point over `interval`. A negative `interval`
/// counts as zero, so timestamps never run backwards.
pub fn fixes_from_waypoints(
    waypoints: &[&Waypoint],
    start: DateTime<Utc>,
    interval: TimeDelta,
) -> Vec<GpsFix> {
    let interval_ms = interval.num_milliseconds().max(0);
    let interval_secs = interval_ms as f64 / 1000.0;
    let positions: Vec<GeoPoint> = waypoints.iter().map(|wp| to_geo_point(wp)).collect();

    waypoints
        .iter()
        .enumerate()
        .map(|(i, wp)| {
            let speed_mps = wp
                .speed
                .filter(|s| s.is_finite() && *s >= 0.0)
                .unwrap_or_else(|| derived_speed(&positions, i, interval_secs));
            let position = positions[i];
            GpsFix {
                lat: position.lat,
                lon: position.lon,
                speed_mps,
                timestamp: offset(start, interval_ms, i),
            }
        })
        .collect()
}

fn offset(start: DateTime<Utc>, interval_ms: i64, i: usize) -> DateTime<Utc> {
    let elapsed_ms = interval_ms.saturating_mul(i64::try_from(i).unwrap_or(i64::MAX));
    start
        .checked_add_signed(TimeDelta::milliseconds(elapsed_ms))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn derived_speed(positions: &[GeoPoint], i: usize, interval_secs: f64) -> f64 {
    if interval_secs <= 0.0 || positions.len() < 2 {
        return 0.0;
    }
    let (a, b) = if i == 0 {
        (positions[0], positions[1])
    } else {
        (positions[i - 1], positions[i])
    };
    direct_distance(a, b) / interval_secs
}

fn to_geo_point(wp: &Waypoint) -> GeoPoint {
    let point = wp.point();
    GeoPoint::new(point.y(), point.x())
}

/// Writes `points` as a single-track GPX 1.1 document.
pub fn write_trace(
    points: &[GeoPoint],
    name: &str,
    writer: impl Write,
) -> Result<(), NavigationError> {
    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("navigator".into()),
        ..Default::default()
    };
    let mut track = Track {
        name: Some(name.into()),
        ..Default::default()
    };

    let mut segment = TrackSegment::new();
    segment
        .points
        .extend(points.iter().map(|p| Waypoint::new(Point::new(p.lon, p.lat))));
    track.segments.push(segment);
    gpx.tracks.push(track);

    gpx::write(&gpx, writer)?;
    Ok(())
}
