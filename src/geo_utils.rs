//! # Geographic Utilities
//!
//! Core geographic computations over coordinate sequences.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two coordinates, meters |
//! | [`polyline_length`] | Total length of a coordinate sequence, meters |
//! | [`path_length_km`] | Total length of a path, kilometers |
//! | [`distance_point_to_path`] | Minimum distance from a point to a path, kilometers |
//! | [`nearest_point_on_path`] | Closest location on a path, with position along it |
//! | [`bearing_between`] | Initial bearing from one coordinate to another |
//! | [`compute_bounds`] | Bounding box of a coordinate sequence |
//!
//! ## Example
//!
//! ```rust
//! use tour_builder::{Coordinate, geo_utils};
//!
//! let path = vec![
//!     Coordinate::new(51.5074, -0.1278),
//!     Coordinate::new(51.5080, -0.1290),
//!     Coordinate::new(51.5090, -0.1300),
//! ];
//!
//! let length = geo_utils::path_length_km(&path).unwrap();
//! let nearest = geo_utils::nearest_point_on_path(&Coordinate::new(51.5081, -0.1288), &path).unwrap();
//! assert!(nearest.distance_km < 0.05);
//! assert!(nearest.distance_along_path_km <= length);
//! ```
//!
//! ## Algorithm Notes
//!
//! Distances use the haversine formula on a spherical Earth (mean radius
//! 6,371,008.8 m). The closest point on each segment is geo's great-circle
//! [`HaversineClosestPoint`], so segments crossing the antimeridian need no
//! special handling.

use geo::{Bearing, Closest, Distance, Haversine, HaversineClosestPoint, Line, Point};

use crate::error::{OptionExt, Result, TourError};
use crate::{Bounds, Coordinate};

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two coordinates in meters.
///
/// # Example
///
/// ```rust
/// use tour_builder::{Coordinate, geo_utils};
///
/// let london = Coordinate::new(51.5074, -0.1278);
/// let paris = Coordinate::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &Coordinate, p2: &Coordinate) -> f64 {
    Haversine::distance(to_point(p1), to_point(p2))
}

/// Great-circle distance between two coordinates in kilometers.
#[inline]
pub fn haversine_km(p1: &Coordinate, p2: &Coordinate) -> f64 {
    haversine_distance(p1, p2) / 1000.0
}

/// Total length of a coordinate sequence in meters.
///
/// Empty or single-point sequences return 0.0.
pub fn polyline_length(points: &[Coordinate]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Total length of a path in kilometers.
///
/// Fails with [`TourError::InvalidGeometry`] for fewer than 2 coordinates.
pub fn path_length_km(path: &[Coordinate]) -> Result<f64> {
    require_line(path)?;
    Ok(polyline_length(path) / 1000.0)
}

/// Cumulative distance in kilometers at each vertex, starting at 0.
pub fn cumulative_distances_km(path: &[Coordinate]) -> Vec<f64> {
    let mut total = 0.0;
    let mut out = Vec::with_capacity(path.len());
    for (i, p) in path.iter().enumerate() {
        if i > 0 {
            total += haversine_km(&path[i - 1], p);
        }
        out.push(total);
    }
    out
}

/// Initial bearing from `a` to `b` in degrees, in `[0, 360)`.
///
/// ```rust
/// use tour_builder::{Coordinate, geo_utils};
///
/// let south = Coordinate::new(0.0, 0.0);
/// let north = Coordinate::new(1.0, 0.0);
/// assert!(geo_utils::bearing_between(&south, &north).abs() < 1e-9);
/// ```
pub fn bearing_between(a: &Coordinate, b: &Coordinate) -> f64 {
    let bearing = Haversine::bearing(to_point(a), to_point(b));
    let normalized = bearing.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

// =============================================================================
// Point-to-Path Functions
// =============================================================================

/// The closest location on a path to some query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    /// The closest location itself (may lie between vertices).
    pub coordinate: Coordinate,
    /// Index of the segment's first vertex (segment `i` joins vertex `i` and `i + 1`).
    pub segment_index: usize,
    /// Whichever endpoint of that segment is closer to `coordinate`.
    pub vertex_index: usize,
    /// Distance from the query point to `coordinate`.
    pub distance_km: f64,
    /// Distance from the path's first vertex to `coordinate`, along the path.
    pub distance_along_path_km: f64,
    /// `distance_along_path_km / path length`, 0 for a zero-length path.
    pub fractional_location: f64,
}

/// Minimum great-circle distance in kilometers from a point to a path.
///
/// Fails with [`TourError::InvalidGeometry`] for fewer than 2 coordinates.
pub fn distance_point_to_path(point: &Coordinate, path: &[Coordinate]) -> Result<f64> {
    require_line(path)?;

    let mut best = f64::INFINITY;
    for w in path.windows(2) {
        let candidate = closest_on_segment(point, &w[0], &w[1]);
        let d = haversine_km(point, &candidate);
        if d < best {
            best = d;
        }
    }
    Ok(best)
}

/// Find the closest location on a path to `point`.
///
/// Segments are scanned in order; on equal distance the earlier segment wins.
///
/// Fails with [`TourError::InvalidGeometry`] for fewer than 2 coordinates.
pub fn nearest_point_on_path(point: &Coordinate, path: &[Coordinate]) -> Result<NearestPoint> {
    require_line(path)?;

    let mut best_segment = 0;
    let mut best_candidate = path[0];
    let mut best_distance = f64::INFINITY;

    for (i, w) in path.windows(2).enumerate() {
        let candidate = closest_on_segment(point, &w[0], &w[1]);
        let d = haversine_km(point, &candidate);
        if d < best_distance {
            best_distance = d;
            best_segment = i;
            best_candidate = candidate;
        }
    }

    let cumulative = cumulative_distances_km(path);
    let total = *cumulative
        .last()
        .ok_or_invalid_geometry("path", path.len())?;

    let start = &path[best_segment];
    let end = &path[best_segment + 1];
    let from_start = haversine_km(start, &best_candidate);
    let from_end = haversine_km(end, &best_candidate);

    let vertex_index = if from_start <= from_end {
        best_segment
    } else {
        best_segment + 1
    };

    let distance_along_path_km = (cumulative[best_segment] + from_start).min(total);
    let fractional_location = if total > 0.0 {
        (distance_along_path_km / total).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Ok(NearestPoint {
        coordinate: best_candidate,
        segment_index: best_segment,
        vertex_index,
        distance_km: best_distance,
        distance_along_path_km,
        fractional_location,
    })
}

/// Closest location to `point` on the great-circle segment `a`-`b`.
///
/// Elevation, when both endpoints have one, is interpolated by the distance
/// from `a`.
fn closest_on_segment(point: &Coordinate, a: &Coordinate, b: &Coordinate) -> Coordinate {
    let segment = Line::new(to_point(a), to_point(b));
    let closest = match segment.haversine_closest_point(&to_point(point)) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => p,
        Closest::Indeterminate => return *a,
    };

    let mut candidate = Coordinate::new(closest.y(), closest.x());
    if let (Some(ea), Some(eb)) = (a.elevation, b.elevation) {
        let length = haversine_distance(a, b);
        let t = if length > 0.0 {
            (haversine_distance(a, &candidate) / length).clamp(0.0, 1.0)
        } else {
            0.0
        };
        candidate.elevation = Some(ea + t * (eb - ea));
    }
    candidate
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a coordinate sequence.
///
/// For empty input, returns bounds with MIN/MAX sentinels; use
/// [`Bounds::from_coordinates`] when the input may be empty.
pub fn compute_bounds(points: &[Coordinate]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds {
        min_lat,
        max_lat,
        min_lng,
        max_lng,
    }
}

// =============================================================================
// Helpers
// =============================================================================

#[inline]
fn to_point(c: &Coordinate) -> Point<f64> {
    Point::new(c.longitude, c.latitude)
}

fn require_line(path: &[Coordinate]) -> Result<()> {
    if path.len() < 2 {
        return Err(TourError::InvalidGeometry {
            context: "path".to_string(),
            point_count: path.len(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    /// North-running line of `n` vertices spaced roughly 1 km apart.
    fn meridian_line(n: usize) -> Vec<Coordinate> {
        let km_in_deg = 1.0 / 111.195;
        (0..n)
            .map(|i| Coordinate::new(i as f64 * km_in_deg, 0.0))
            .collect()
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = Coordinate::new(51.5074, -0.1278);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_path_length_km_rejects_single_point() {
        let single = vec![Coordinate::new(51.5074, -0.1278)];
        assert!(matches!(
            path_length_km(&single),
            Err(TourError::InvalidGeometry { point_count: 1, .. })
        ));
    }

    #[test]
    fn test_path_length_km_meridian() {
        let line = meridian_line(11);
        let km = path_length_km(&line).unwrap();
        assert!(approx_eq(km, 10.0, 0.01));
    }

    #[test]
    fn test_projection_between_vertices() {
        let line = meridian_line(3);
        let query = Coordinate::new(0.5 / 111.195, 0.001);
        let nearest = nearest_point_on_path(&query, &line).unwrap();
        assert_eq!(nearest.segment_index, 0);
        assert!(approx_eq(nearest.coordinate.longitude, 0.0, 1e-7));
        assert!(approx_eq(nearest.distance_along_path_km, 0.5, 0.01));
        assert!(approx_eq(nearest.fractional_location, 0.25, 0.01));
    }

    #[test]
    fn test_projection_clamps_to_endpoint() {
        let line = meridian_line(2);
        let before_start = Coordinate::new(-0.01, 0.0);
        let nearest = nearest_point_on_path(&before_start, &line).unwrap();
        assert_eq!(nearest.vertex_index, 0);
        assert_eq!(nearest.fractional_location, 0.0);
    }

    #[test]
    fn test_distance_point_to_path_perpendicular() {
        let line = meridian_line(3);
        // ~1.11 km east of the line at the equator
        let query = Coordinate::new(1.0 / 111.195, 0.01);
        let d = distance_point_to_path(&query, &line).unwrap();
        assert!(approx_eq(d, 1.112, 0.01));
    }

    #[test]
    fn test_zero_length_path_has_zero_fraction() {
        let p = Coordinate::new(10.0, 10.0);
        let nearest = nearest_point_on_path(&Coordinate::new(10.1, 10.0), &[p, p]).unwrap();
        assert_eq!(nearest.fractional_location, 0.0);
        assert_eq!(nearest.vertex_index, 0);
    }

    #[test]
    fn test_closest_point_interpolates_elevation() {
        let a = Coordinate::new(0.0, 0.0).with_elevation(100.0);
        let b = Coordinate::new(0.02, 0.0).with_elevation(200.0);
        let closest = closest_on_segment(&Coordinate::new(0.005, 0.003), &a, &b);
        assert!(approx_eq(closest.latitude, 0.005, 1e-6));
        assert!(approx_eq(closest.elevation.unwrap(), 125.0, 0.1));

        let flat = closest_on_segment(&Coordinate::new(0.005, 0.003), &Coordinate::new(0.0, 0.0), &b);
        assert!(flat.elevation.is_none());
    }

    #[test]
    fn test_closest_point_off_the_end_is_the_endpoint() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.01, 0.0);
        let closest = closest_on_segment(&Coordinate::new(0.02, 0.001), &a, &b);
        assert!(approx_eq(closest.latitude, 0.01, 1e-6));
        assert!(approx_eq(closest.longitude, 0.0, 1e-6));
    }

    #[test]
    fn test_bearing_east() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        assert!(approx_eq(bearing_between(&a, &b), 90.0, 1e-6));
    }

    #[test]
    fn test_bearing_west_is_positive() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, -1.0);
        assert!(approx_eq(bearing_between(&a, &b), 270.0, 1e-6));
    }

    #[test]
    fn test_compute_bounds() {
        let track = vec![
            Coordinate::new(51.50, -0.13),
            Coordinate::new(51.51, -0.12),
            Coordinate::new(51.505, -0.125),
        ];
        let bounds = compute_bounds(&track);
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lat, 51.51);
        assert_eq!(bounds.min_lng, -0.13);
        assert_eq!(bounds.max_lng, -0.12);
    }
}
