//! Integration tests for the merged document format

use std::fs;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use tempfile::TempDir;
use tour_builder::assembler::build_path;
use tour_builder::{
    merge, Coordinate, ImageKind, MatchMethod, MatchedWaypoint, MergedDocument, PartitionKey,
    Path, Properties, TourError,
};

fn at(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
}

fn sample_path() -> Path {
    let t0 = at("2022-05-01T08:00:00Z");
    build_path(
        PartitionKey("2022-05-01".to_string()),
        Some("Centro".to_string()),
        vec!["centro.gpx".to_string()],
        vec![
            Coordinate::new(19.4326, -99.1332).with_elevation(2240.0),
            Coordinate::new(19.4340, -99.1332).with_elevation(2241.0),
            Coordinate::new(19.4360, -99.1330).with_elevation(2242.5),
        ],
        vec![t0, t0 + Duration::seconds(90), t0 + Duration::seconds(300)],
        Tz::America__Mexico_City,
    )
}

fn temporal_waypoint() -> MatchedWaypoint {
    MatchedWaypoint {
        source_id: "IMG_0002.jpg".to_string(),
        kind: ImageKind::Flat,
        coordinate: Coordinate::new(19.4340, -99.1332),
        timestamp: Some(at("2022-05-01T08:01:00Z")),
        path_key: PartitionKey("2022-05-01".to_string()),
        path_position_index: 1,
        fractional_location: None,
        method: MatchMethod::Temporal,
        distance_to_path_km: None,
        properties: Properties::new(),
    }
}

fn spatial_waypoint() -> MatchedWaypoint {
    MatchedWaypoint {
        source_id: "PANO_0001.jpg".to_string(),
        kind: ImageKind::Panoramic,
        coordinate: Coordinate::new(19.4359, -99.1331),
        timestamp: None,
        path_key: PartitionKey("2022-05-01".to_string()),
        path_position_index: 2,
        fractional_location: Some(0.98),
        method: MatchMethod::Spatial,
        distance_to_path_km: Some(0.014),
        properties: Properties::new(),
    }
}

#[test]
fn test_document_is_geojson() {
    let doc = merge(vec![sample_path()], vec![spatial_waypoint(), temporal_waypoint()]);
    let json: Value = serde_json::from_str(&doc.to_json_string().unwrap()).unwrap();

    assert_eq!(json["type"], "FeatureCollection");
    let features = json["features"].as_array().unwrap();
    assert_eq!(features.len(), 3);

    let line = &features[0];
    assert_eq!(line["type"], "Feature");
    assert_eq!(line["geometry"]["type"], "LineString");
    // Positions are [lon, lat, ele]
    assert_eq!(line["geometry"]["coordinates"][0][0], -99.1332);
    assert_eq!(line["geometry"]["coordinates"][0][1], 19.4326);
    assert_eq!(line["geometry"]["coordinates"][0][2], 2240.0);
    assert_eq!(line["properties"]["key"], "2022-05-01");
    assert_eq!(line["properties"]["timezone"], "America/Mexico_City");
    assert_eq!(line["properties"]["durationSeconds"], 300.0);
    assert_eq!(line["properties"]["elapsedSeconds"][1], 90.0);
    assert_eq!(line["properties"]["timestamps"][0], "2022-05-01T08:00:00Z");

    let pano = &features[1];
    assert_eq!(pano["geometry"]["type"], "Point");
    assert_eq!(pano["properties"]["kind"], "panoramic");
    assert_eq!(pano["properties"]["matchMethod"], "spatial");
    assert_eq!(pano["properties"]["pathPositionIndex"], 2);
    assert!(pano["properties"].get("timestamp").is_none());

    let flat = &features[2];
    assert_eq!(flat["properties"]["matchMethod"], "temporal");
    assert!(flat["properties"].get("fractionalLocation").is_none());
    assert!(flat["properties"].get("distanceToPathKm").is_none());
}

#[test]
fn test_document_round_trip_preserves_order() {
    let doc = merge(vec![sample_path()], vec![temporal_waypoint(), spatial_waypoint()]);
    let parsed = MergedDocument::from_json_str(&doc.to_json_string_pretty().unwrap()).unwrap();

    assert_eq!(parsed.paths[0].key, doc.paths[0].key);
    assert_eq!(parsed.paths[0].timezone, Tz::America__Mexico_City);
    assert_eq!(parsed.paths[0].timestamps, doc.paths[0].timestamps);
    let ids: Vec<&str> = parsed.waypoints.iter().map(|w| w.source_id.as_str()).collect();
    assert_eq!(ids, vec!["IMG_0002.jpg", "PANO_0001.jpg"]);
}

#[test]
fn test_source_properties_survive_round_trip() {
    let mut path = sample_path();
    path.properties.insert("videoId".to_string(), json!("abc"));
    // Computed keys are not overwritten by source properties
    path.properties.insert("key".to_string(), json!("from-source"));
    let mut photo = spatial_waypoint();
    photo.properties.insert("iconSize".to_string(), json!([400, 300]));

    let doc = merge(vec![path], vec![photo]);
    let text = doc.to_json_string().unwrap();
    let json: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["features"][0]["properties"]["videoId"], "abc");
    assert_eq!(json["features"][0]["properties"]["key"], "2022-05-01");
    assert_eq!(json["features"][1]["properties"]["iconSize"], json!([400, 300]));

    let parsed = MergedDocument::from_json_str(&text).unwrap();
    assert_eq!(parsed.paths[0].properties["videoId"], "abc");
    assert!(!parsed.paths[0].properties.contains_key("key"));
    assert_eq!(parsed.waypoints[0].properties["iconSize"], json!([400, 300]));
}

#[test]
fn test_rejects_mismatched_arrays() {
    let json = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":{"type":"LineString","coordinates":[[0.0,0.0],[0.0,0.01]]},
         "properties":{"key":"2022-05-01","timestamps":["2022-05-01T08:00:00Z"],
                       "durationSeconds":0.0,"distanceKm":1.1,"elapsedSeconds":[0.0],
                       "timezone":"UTC"}}]}"#;

    let err = MergedDocument::from_json_str(json).unwrap_err();
    assert!(err.to_string().contains("2022-05-01"));
}

#[test]
fn test_write_replaces_existing_file() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("tour.geojson");
    fs::write(&dest, "stale").unwrap();

    let doc = merge(vec![sample_path()], vec![temporal_waypoint()]);
    doc.write_to(&dest).unwrap();

    let loaded = MergedDocument::read_from(&dest).unwrap();
    assert_eq!(loaded.waypoints.len(), 1);

    // No temporary file is left next to the output
    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["tour.geojson"]);
}

#[test]
fn test_read_missing_document() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        MergedDocument::read_from(&dir.path().join("absent.geojson")),
        Err(TourError::MissingInputFile { .. })
    ));
}

#[test]
fn test_playback_queries() {
    let doc = merge(
        vec![sample_path()],
        vec![
            temporal_waypoint(),
            spatial_waypoint(),
            MatchedWaypoint {
                source_id: "IMG_0003.jpg".to_string(),
                ..temporal_waypoint()
            },
        ],
    );

    let stops = doc.waypoints_for_path("2022-05-01");
    assert_eq!(stops.len(), 2);
    // Later waypoint on the same vertex wins
    assert_eq!(stops[&1].source_id, "IMG_0003.jpg");
    assert!(doc.waypoints_for_path("2022-05-02").is_empty());

    let path = doc.path("2022-05-01").unwrap();
    assert_eq!(path.elapsed_phases(), vec![0.0, 0.3, 1.0]);
    assert_eq!(path.vertex_index_at_elapsed(60.0), Some(1));

    let summary = doc.summary();
    assert_eq!(summary.waypoint_count, 3);
    assert_eq!(summary.total_duration_seconds, 300.0);
    let bounds = summary.bounds.unwrap();
    assert_eq!(bounds.min_lat, 19.4326);
    assert_eq!(bounds.max_lat, 19.4360);
}
