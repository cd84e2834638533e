//! GeoJSON adapters.
//!
//! Tracks: a `FeatureCollection` (or single `Feature`) whose line features
//! carry a parallel `coordTimes` property, the shape togeojson produces from
//! GPX/KML. `LineString` takes an array of times, `MultiLineString` an array
//! of arrays. A `timezone` property names the IANA zone the track was
//! recorded in; it overrides the adapter's zone for that feature. Other
//! geometry types pass through as unsupported so the collector can report
//! them.
//!
//! Photos: `Point` features whose properties describe the capture:
//!
//! | Property | Meaning |
//! |----------|---------|
//! | `sourceId` / `img_name` | File name |
//! | `kind` (`flat`/`panoramic`) / `img_type` (`FLAT`/`PANO`) / `cameraMake` | Capture kind |
//! | `timestamp` | Absolute instant: epoch seconds or ISO 8601 |
//! | `localTimestamp` | Camera epoch seconds counted in local time |
//!
//! A `null` geometry, or a position without a numeric longitude and
//! latitude, means the photo has no position fix. A `null` elevation is
//! simply absent.
//!
//! Every other property (a photo's `iconSize`, a track's `videoId`) is kept
//! on the resulting record and ends up in the tour document.

use std::fs;
use std::path::{Path as FsPath, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use geojson::{Feature, GeoJson, Value as GeometryValue};
use log::{info, warn};
use serde_json::Value;

use super::{feature_label, file_label, PointSource, TrackSource};
use crate::error::{Result, TourError};
use crate::temporal::{local_epoch_to_instant, parse_instant, parse_timezone};
use crate::{Coordinate, ImageKind, PointEvent, TrackFeature, TrackGeometry, TrackLine};

// ============================================================================
// Tracks
// ============================================================================

/// A GeoJSON file of track features.
#[derive(Debug, Clone)]
pub struct GeoJsonTrackFile {
    pub path: PathBuf,
    /// Zone for offset-less times of features without their own `timezone`.
    /// Usually the run's default zone.
    pub timezone: Tz,
}

impl GeoJsonTrackFile {
    pub fn new(path: &FsPath, timezone: Tz) -> Self {
        Self {
            path: path.to_path_buf(),
            timezone,
        }
    }

    /// Parse track features from GeoJSON text.
    pub fn parse_str(source_id: &str, json: &str, timezone: Tz) -> Result<Vec<TrackFeature>> {
        let root: Value = serde_json::from_str(json)?;
        let features = feature_list(source_id, GeoJson::from_json_value(root)?)?;
        let count = features.len();

        features
            .into_iter()
            .enumerate()
            .map(|(i, feature)| {
                let id = feature_label(source_id, i, count);
                parse_track_feature(&id, feature, timezone)
            })
            .collect()
    }
}

impl TrackSource for GeoJsonTrackFile {
    fn read_tracks(&self) -> Result<Vec<TrackFeature>> {
        let json = read_required(&self.path)?;
        Self::parse_str(&file_label(&self.path), &json, self.timezone)
    }
}

fn parse_track_feature(source_id: &str, feature: Feature, default_timezone: Tz) -> Result<TrackFeature> {
    let mut properties = feature.properties.unwrap_or_default();
    let name = properties
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let timezone = match properties.get("timezone").and_then(Value::as_str) {
        Some(zone) => Some(parse_timezone(zone)?),
        None => None,
    };
    let read_zone = timezone.unwrap_or(default_timezone);
    let times = properties.remove("coordTimes");

    let geometry = match feature.geometry.map(|g| g.value) {
        Some(GeometryValue::LineString(line)) => {
            let coordinates = positions(source_id, line)?;
            let timestamps = instants(source_id, times.as_ref(), read_zone)?;
            TrackGeometry::LineString(TrackLine::new(coordinates, timestamps))
        }
        Some(GeometryValue::MultiLineString(parts)) => {
            let part_times: Vec<Option<&Value>> = match times.as_ref() {
                Some(t) => array(source_id, t, "coordTimes")?.iter().map(Some).collect(),
                None => vec![None; parts.len()],
            };
            if part_times.len() != parts.len() {
                return Err(ingest_error(
                    source_id,
                    format!(
                        "{} lines but {} coordTimes arrays",
                        parts.len(),
                        part_times.len()
                    ),
                ));
            }
            let lines = parts
                .into_iter()
                .zip(part_times)
                .map(|(part, t)| {
                    Ok(TrackLine::new(
                        positions(source_id, part)?,
                        instants(source_id, t, read_zone)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            TrackGeometry::MultiLineString(lines)
        }
        Some(other) => TrackGeometry::Unsupported {
            geometry_type: geometry_type(&other).to_string(),
        },
        None => TrackGeometry::Unsupported {
            geometry_type: "null".to_string(),
        },
    };

    Ok(TrackFeature {
        source_id: source_id.to_string(),
        name,
        timezone,
        geometry,
        properties,
    })
}

// ============================================================================
// Photos
// ============================================================================

/// A GeoJSON file of photo point features.
#[derive(Debug, Clone)]
pub struct GeoJsonPointFile {
    pub path: PathBuf,
    /// Zone for offset-less times and local camera timestamps.
    pub timezone: Tz,
    /// When true, a missing file yields no events instead of an error.
    pub optional: bool,
}

impl GeoJsonPointFile {
    pub fn new(path: &FsPath, timezone: Tz) -> Self {
        Self {
            path: path.to_path_buf(),
            timezone,
            optional: false,
        }
    }

    /// Treat a missing file as "no photos" rather than an error.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Parse point events from GeoJSON text.
    ///
    /// Non-point features are skipped with a warning.
    pub fn parse_str(source_id: &str, json: &str, timezone: Tz) -> Result<Vec<PointEvent>> {
        let mut root: Value = serde_json::from_str(json)?;
        clean_point_positions(&mut root);
        let features = feature_list(source_id, GeoJson::from_json_value(root)?)?;
        let count = features.len();
        let mut events = Vec::with_capacity(count);

        for (i, feature) in features.into_iter().enumerate() {
            let fallback_id = feature_label(source_id, i, count);
            match parse_point_feature(&fallback_id, feature, timezone)? {
                Some(event) => events.push(event),
                None => warn!("[ingest] Ignoring non-point feature {}", fallback_id),
            }
        }

        Ok(events)
    }
}

impl PointSource for GeoJsonPointFile {
    fn read_points(&self) -> Result<Vec<PointEvent>> {
        if self.optional && !self.path.exists() {
            info!(
                "[ingest] Couldn't find image file {}, creating image-less tour",
                self.path.display()
            );
            return Ok(Vec::new());
        }
        let json = read_required(&self.path)?;
        Self::parse_str(&file_label(&self.path), &json, self.timezone)
    }
}

fn parse_point_feature(fallback_id: &str, feature: Feature, timezone: Tz) -> Result<Option<PointEvent>> {
    let coordinate = match feature.geometry.map(|g| g.value) {
        Some(GeometryValue::Point(position)) => Coordinate::try_from(position).ok(),
        None => None,
        Some(_) => return Ok(None),
    };

    let properties = feature.properties.unwrap_or_default();
    let prop_str = |name: &str| properties.get(name).and_then(Value::as_str);

    let source_id = prop_str("sourceId")
        .or_else(|| prop_str("img_name"))
        .unwrap_or(fallback_id)
        .to_string();

    let kind = match (prop_str("kind"), prop_str("img_type"), prop_str("cameraMake")) {
        (Some(k), _, _) if k.eq_ignore_ascii_case("panoramic") => ImageKind::Panoramic,
        (Some(_), _, _) => ImageKind::Flat,
        (None, Some(t), _) if t.eq_ignore_ascii_case("pano") => ImageKind::Panoramic,
        (None, Some(_), _) => ImageKind::Flat,
        (None, None, Some(make)) => ImageKind::from_camera_make(make),
        (None, None, None) => ImageKind::Flat,
    };

    let timestamp = match (properties.get("timestamp"), properties.get("localTimestamp")) {
        (Some(t), _) if !t.is_null() => Some(instant(&source_id, t, timezone)?),
        (_, Some(local)) if !local.is_null() => {
            let seconds = local.as_i64().ok_or_else(|| {
                ingest_error(&source_id, "localTimestamp must be whole epoch seconds")
            })?;
            Some(local_epoch_to_instant(seconds, timezone)?)
        }
        _ => None,
    };

    Ok(Some(PointEvent {
        source_id,
        kind,
        coordinate,
        timestamp,
        properties,
    }))
}

/// Photo exporters write `null` for EXIF values they could not read, which
/// is not a valid GeoJSON position. Drop a null elevation; turn a position
/// without numeric longitude and latitude into a null geometry.
fn clean_point_positions(root: &mut Value) {
    let root_type = root.get("type").and_then(Value::as_str).map(str::to_string);
    let features: Vec<&mut Value> = match root_type.as_deref() {
        Some("FeatureCollection") => match root.get_mut("features").and_then(Value::as_array_mut) {
            Some(features) => features.iter_mut().collect(),
            None => return,
        },
        Some("Feature") => vec![root],
        _ => return,
    };

    for feature in features {
        let Some(geometry) = feature.get_mut("geometry") else {
            continue;
        };
        if geometry.get("type").and_then(Value::as_str) != Some("Point") {
            continue;
        }
        let cleaned = geometry
            .get("coordinates")
            .and_then(Value::as_array)
            .and_then(|values| position_with_fix(values));
        match cleaned {
            Some(position) => geometry["coordinates"] = Value::from(position),
            None => *geometry = Value::Null,
        }
    }
}

fn position_with_fix(values: &[Value]) -> Option<Vec<f64>> {
    let lon = values.first()?.as_f64()?;
    let lat = values.get(1)?.as_f64()?;
    Some(match values.get(2).and_then(Value::as_f64) {
        Some(ele) => vec![lon, lat, ele],
        None => vec![lon, lat],
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn read_required(path: &FsPath) -> Result<String> {
    if !path.exists() {
        return Err(TourError::MissingInputFile {
            path: path.to_path_buf(),
        });
    }
    Ok(fs::read_to_string(path)?)
}

fn ingest_error(source_id: &str, message: impl Into<String>) -> TourError {
    TourError::Ingest {
        source_id: source_id.to_string(),
        message: message.into(),
    }
}

/// Features of a `FeatureCollection`, or the lone `Feature`.
fn feature_list(source_id: &str, root: GeoJson) -> Result<Vec<Feature>> {
    match root {
        GeoJson::FeatureCollection(collection) => Ok(collection.features),
        GeoJson::Feature(feature) => Ok(vec![feature]),
        GeoJson::Geometry(geometry) => Err(ingest_error(
            source_id,
            format!(
                "expected a Feature or FeatureCollection, got a bare {}",
                geometry_type(&geometry.value)
            ),
        )),
    }
}

fn geometry_type(value: &GeometryValue) -> &'static str {
    match value {
        GeometryValue::Point(_) => "Point",
        GeometryValue::MultiPoint(_) => "MultiPoint",
        GeometryValue::LineString(_) => "LineString",
        GeometryValue::MultiLineString(_) => "MultiLineString",
        GeometryValue::Polygon(_) => "Polygon",
        GeometryValue::MultiPolygon(_) => "MultiPolygon",
        GeometryValue::GeometryCollection(_) => "GeometryCollection",
    }
}

fn array<'a>(source_id: &str, value: &'a Value, what: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| ingest_error(source_id, format!("'{}' must be an array", what)))
}

fn positions(source_id: &str, line: Vec<Vec<f64>>) -> Result<Vec<Coordinate>> {
    line.into_iter()
        .map(|p| Coordinate::try_from(p).map_err(|e| ingest_error(source_id, e)))
        .collect()
}

fn instants(source_id: &str, value: Option<&Value>, timezone: Tz) -> Result<Vec<DateTime<Utc>>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => array(source_id, v, "coordTimes")?
            .iter()
            .map(|t| instant(source_id, t, timezone))
            .collect(),
    }
}

/// An instant from an ISO string or a number of epoch seconds.
fn instant(source_id: &str, value: &Value, timezone: Tz) -> Result<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_instant(text, timezone),
        Value::Number(n) => {
            let seconds = n
                .as_f64()
                .ok_or_else(|| ingest_error(source_id, "timestamp is not a number"))?;
            let whole = seconds.floor();
            let nanos = ((seconds - whole) * 1e9).round() as u32;
            DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
                .ok_or_else(|| ingest_error(source_id, format!("timestamp {} out of range", seconds)))
        }
        other => Err(ingest_error(
            source_id,
            format!("unsupported timestamp value {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiline_requires_matching_time_arrays() {
        let json = r#"{"type":"Feature","properties":{"coordTimes":[["2022-05-01T08:00:00Z","2022-05-01T08:01:00Z"]]},
            "geometry":{"type":"MultiLineString","coordinates":[[[-99.0,19.0],[-99.0,19.1]],[[-99.0,19.2],[-99.0,19.3]]]}}"#;
        assert!(matches!(
            GeoJsonTrackFile::parse_str("trip.geojson", json, Tz::UTC),
            Err(TourError::Ingest { .. })
        ));
    }

    #[test]
    fn test_null_position_means_no_coordinate() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"img_name":"PANO_1.jpg","img_type":"PANO","timestamp":1651392000},
             "geometry":{"type":"Point","coordinates":[null,null,null]}}]}"#;
        let events = GeoJsonPointFile::parse_str("images.geojson", json, Tz::UTC).unwrap();
        assert_eq!(events[0].source_id, "PANO_1.jpg");
        assert_eq!(events[0].kind, ImageKind::Panoramic);
        assert!(events[0].coordinate.is_none());
        assert!(events[0].timestamp.is_some());
    }

    #[test]
    fn test_position_with_fix() {
        let lonlat = [Value::from(-99.1), Value::from(19.4)];
        assert_eq!(position_with_fix(&lonlat), Some(vec![-99.1, 19.4]));

        let null_ele = [Value::from(-99.1), Value::from(19.4), Value::Null];
        assert_eq!(position_with_fix(&null_ele), Some(vec![-99.1, 19.4]));

        let null_lat = [Value::from(-99.1), Value::Null, Value::from(2240.0)];
        assert_eq!(position_with_fix(&null_lat), None);
    }

    #[test]
    fn test_coord_times_are_not_kept_as_properties() {
        let json = r#"{"type":"Feature","properties":{"videoId":"abc",
            "coordTimes":["2022-05-01T08:00:00Z","2022-05-01T08:01:00Z"]},
            "geometry":{"type":"LineString","coordinates":[[-99.0,19.0],[-99.0,19.001]]}}"#;
        let features = GeoJsonTrackFile::parse_str("trip.geojson", json, Tz::UTC).unwrap();
        assert_eq!(features[0].properties["videoId"], "abc");
        assert!(!features[0].properties.contains_key("coordTimes"));
    }
}
