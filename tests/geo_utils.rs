//! Integration tests for geo_utils

use tour_builder::{geo_utils, Coordinate, TourError};

const KM_PER_DEGREE: f64 = 111.195;

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// Straight line north along the prime meridian, one vertex per kilometer.
fn meridian_line(km: usize) -> Vec<Coordinate> {
    (0..=km)
        .map(|i| Coordinate::new(i as f64 / KM_PER_DEGREE, 0.0))
        .collect()
}

#[test]
fn test_haversine_known_distance() {
    let london = Coordinate::new(51.5074, -0.1278);
    let paris = Coordinate::new(48.8566, 2.3522);
    let d = geo_utils::haversine_distance(&london, &paris);
    assert!(d > 340_000.0 && d < 345_000.0, "got {}", d);
}

#[test]
fn test_distance_is_symmetric() {
    let a = Coordinate::new(19.4326, -99.1332);
    let b = Coordinate::new(20.6597, -103.3496);
    assert!(approx_eq(
        geo_utils::haversine_km(&a, &b),
        geo_utils::haversine_km(&b, &a),
        1e-9
    ));
}

#[test]
fn test_path_length_on_meridian() {
    let path = meridian_line(10);
    let length = geo_utils::path_length_km(&path).unwrap();
    assert!(approx_eq(length, 10.0, 0.01), "got {}", length);
}

#[test]
fn test_path_length_requires_two_points() {
    let single = vec![Coordinate::new(0.0, 0.0)];
    assert!(matches!(
        geo_utils::path_length_km(&single),
        Err(TourError::InvalidGeometry { point_count: 1, .. })
    ));
}

#[test]
fn test_point_on_path_has_zero_distance() {
    let path = meridian_line(10);
    for vertex in &path {
        let d = geo_utils::distance_point_to_path(vertex, &path).unwrap();
        assert!(d < 1e-6, "vertex distance {}", d);
    }
}

#[test]
fn test_distance_to_path_offset() {
    let path = meridian_line(10);
    // ~111 m east of km 5
    let point = Coordinate::new(5.0 / KM_PER_DEGREE, 0.001);
    let d = geo_utils::distance_point_to_path(&point, &path).unwrap();
    assert!(approx_eq(d, 0.111, 0.002), "got {}", d);
}

#[test]
fn test_nearest_point_between_vertices() {
    let path = meridian_line(10);
    // Slightly past the middle of the 4th segment, off to the side
    let point = Coordinate::new(3.6 / KM_PER_DEGREE, 0.0005);
    let nearest = geo_utils::nearest_point_on_path(&point, &path).unwrap();

    assert_eq!(nearest.segment_index, 3);
    assert_eq!(nearest.vertex_index, 4);
    assert!(approx_eq(nearest.distance_along_path_km, 3.6, 0.01));
    assert!(approx_eq(nearest.fractional_location, 0.36, 0.001));
    assert!(approx_eq(nearest.coordinate.longitude, 0.0, 1e-9));
}

#[test]
fn test_nearest_point_clamps_past_the_end() {
    let path = meridian_line(10);
    let beyond = Coordinate::new(12.0 / KM_PER_DEGREE, 0.0);
    let nearest = geo_utils::nearest_point_on_path(&beyond, &path).unwrap();

    assert_eq!(nearest.vertex_index, 10);
    assert!(approx_eq(nearest.fractional_location, 1.0, 1e-9));
    assert!(approx_eq(nearest.distance_km, 2.0, 0.01));
}

#[test]
fn test_nearest_point_across_antimeridian() {
    let path = vec![Coordinate::new(0.0, 179.99), Coordinate::new(0.0, -179.99)];
    let point = Coordinate::new(0.001, 180.0);
    let nearest = geo_utils::nearest_point_on_path(&point, &path).unwrap();

    // The short way across the date line, not around the globe
    assert!(nearest.distance_km < 0.2, "got {}", nearest.distance_km);
    assert!(approx_eq(nearest.fractional_location, 0.5, 0.01));
}

#[test]
fn test_bearing_is_normalized() {
    let origin = Coordinate::new(0.0, 0.0);
    let north = geo_utils::bearing_between(&origin, &Coordinate::new(1.0, 0.0));
    let west = geo_utils::bearing_between(&origin, &Coordinate::new(0.0, -1.0));
    assert!(approx_eq(north, 0.0, 1e-6) || approx_eq(north, 360.0, 1e-6));
    assert!(approx_eq(west, 270.0, 1e-6));
    assert!((0.0..360.0).contains(&west));
}

#[test]
fn test_bounds() {
    let path = vec![
        Coordinate::new(19.0, -99.5),
        Coordinate::new(19.5, -99.0),
        Coordinate::new(19.2, -99.2),
    ];
    let bounds = geo_utils::compute_bounds(&path);
    assert_eq!(bounds.min_lat, 19.0);
    assert_eq!(bounds.max_lat, 19.5);
    assert_eq!(bounds.min_lng, -99.5);
    assert_eq!(bounds.max_lng, -99.0);
}
