//! Merged output document.
//!
//! The document is a GeoJSON `FeatureCollection`: one `LineString` feature
//! per path followed by one `Point` feature per matched waypoint. Waypoints
//! refer back to their path by key and vertex index; paths are never
//! modified by matching.
//!
//! ```json
//! {"type":"FeatureCollection","features":[
//!   {"type":"Feature",
//!    "geometry":{"type":"LineString","coordinates":[[-99.13,19.43],[-99.13,19.44]]},
//!    "properties":{"key":"2022-05-01","sourceIds":["a.gpx"],
//!                  "timestamps":["2022-05-01T08:00:00Z","2022-05-01T08:10:00Z"],
//!                  "durationSeconds":600.0,"distanceKm":1.11,
//!                  "elapsedSeconds":[0.0,600.0],"timezone":"UTC","videoId":"abc"}},
//!   {"type":"Feature",
//!    "geometry":{"type":"Point","coordinates":[-99.13,19.436]},
//!    "properties":{"kind":"flat","sourceId":"IMG_1.jpg","pathKey":"2022-05-01",
//!                  "pathPositionIndex":1,"fractionalLocation":0.54,
//!                  "matchMethod":"spatial","distanceToPathKm":0.02,
//!                  "iconSize":[400,300]}}
//! ]}
//! ```
//!
//! Source properties the pipeline does not interpret (`videoId`, `iconSize`)
//! sit next to the computed ones. On a name clash the computed value is kept.

use std::fs;
use std::io::Write;
use std::path::Path as FsPath;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use geojson::{Feature, FeatureCollection, Geometry, Value as GeometryValue};
use log::info;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tempfile::NamedTempFile;

use crate::error::{Result, TourError};
use crate::{Coordinate, ImageKind, MatchMethod, MatchedWaypoint, PartitionKey, Path, Properties};

/// The single artifact handed to the playback side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedDocument {
    pub paths: Vec<Path>,
    pub waypoints: Vec<MatchedWaypoint>,
}

/// Combine paths and waypoints into one document. Paths keep their order.
pub fn merge(paths: Vec<Path>, waypoints: Vec<MatchedWaypoint>) -> MergedDocument {
    MergedDocument { paths, waypoints }
}

impl MergedDocument {
    /// Serialize as compact GeoJSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document previously produced by [`MergedDocument::to_json_string`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the document to `dest`.
    ///
    /// The whole document is serialized before anything touches the disk,
    /// then written to a uniquely named temporary file in the destination
    /// directory and persisted over `dest`. Readers never see a partial
    /// document, and a failed write removes its temporary file.
    pub fn write_to(&self, dest: &FsPath) -> Result<()> {
        let bytes = serde_json::to_vec(self)?;
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => FsPath::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| e.error)?;

        info!(
            "[document] File {} saved ({} paths, {} waypoints, {} bytes)",
            dest.display(),
            self.paths.len(),
            self.waypoints.len(),
            bytes.len()
        );
        Ok(())
    }

    /// Read a document from disk.
    pub fn read_from(src: &FsPath) -> Result<Self> {
        if !src.exists() {
            return Err(TourError::MissingInputFile {
                path: src.to_path_buf(),
            });
        }
        let json = fs::read_to_string(src)?;
        Self::from_json_str(&json)
    }
}

impl Serialize for MergedDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        FeatureCollection::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MergedDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let collection = FeatureCollection::deserialize(deserializer)?;
        MergedDocument::try_from(collection).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// GeoJSON mapping
// ============================================================================

/// Properties of a path (line) feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathProperties {
    key: PartitionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    source_ids: Vec<String>,
    timestamps: Vec<DateTime<Utc>>,
    duration_seconds: f64,
    distance_km: f64,
    elapsed_seconds: Vec<f64>,
    timezone: Tz,
    #[serde(flatten)]
    extra: Properties,
}

/// Properties of a waypoint (point) feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WaypointProperties {
    kind: ImageKind,
    source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
    path_key: PartitionKey,
    path_position_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fractional_location: Option<f64>,
    match_method: MatchMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    distance_to_path_km: Option<f64>,
    #[serde(flatten)]
    extra: Properties,
}

const PATH_KEYS: &[&str] = &[
    "key",
    "name",
    "sourceIds",
    "timestamps",
    "durationSeconds",
    "distanceKm",
    "elapsedSeconds",
    "timezone",
];

const WAYPOINT_KEYS: &[&str] = &[
    "kind",
    "sourceId",
    "timestamp",
    "pathKey",
    "pathPositionIndex",
    "fractionalLocation",
    "matchMethod",
    "distanceToPathKm",
];

fn invalid(message: String) -> TourError {
    TourError::InvalidDocument { message }
}

/// Computed properties, then every source property whose name is not one of
/// the computed `reserved` names, even when the computed value was omitted.
fn with_source_properties<T: Serialize>(
    computed: &T,
    source: &Properties,
    reserved: &[&str],
) -> Result<Properties> {
    let mut properties = match serde_json::to_value(computed)? {
        serde_json::Value::Object(map) => map,
        other => return Err(invalid(format!("properties serialized as {}", other))),
    };
    for (name, value) in source {
        if !reserved.contains(&name.as_str()) {
            properties.insert(name.clone(), value.clone());
        }
    }
    Ok(properties)
}

fn feature(value: GeometryValue, properties: Properties) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn path_feature(path: &Path) -> Result<Feature> {
    let computed = PathProperties {
        key: path.key.clone(),
        name: path.name.clone(),
        source_ids: path.source_ids.clone(),
        timestamps: path.timestamps.clone(),
        duration_seconds: path.duration_seconds,
        distance_km: path.distance_km,
        elapsed_seconds: path.elapsed_seconds.clone(),
        timezone: path.timezone,
        extra: Properties::new(),
    };
    let positions = path.coordinates.iter().map(|&c| c.into()).collect();
    Ok(feature(
        GeometryValue::LineString(positions),
        with_source_properties(&computed, &path.properties, PATH_KEYS)?,
    ))
}

fn waypoint_feature(w: &MatchedWaypoint) -> Result<Feature> {
    let computed = WaypointProperties {
        kind: w.kind,
        source_id: w.source_id.clone(),
        timestamp: w.timestamp,
        path_key: w.path_key.clone(),
        path_position_index: w.path_position_index,
        fractional_location: w.fractional_location,
        match_method: w.method,
        distance_to_path_km: w.distance_to_path_km,
        extra: Properties::new(),
    };
    Ok(feature(
        GeometryValue::Point(w.coordinate.into()),
        with_source_properties(&computed, &w.properties, WAYPOINT_KEYS)?,
    ))
}

impl TryFrom<&MergedDocument> for FeatureCollection {
    type Error = TourError;

    fn try_from(doc: &MergedDocument) -> Result<Self> {
        let mut features = Vec::with_capacity(doc.paths.len() + doc.waypoints.len());
        for path in &doc.paths {
            features.push(path_feature(path)?);
        }
        for waypoint in &doc.waypoints {
            features.push(waypoint_feature(waypoint)?);
        }
        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }
}

impl TryFrom<FeatureCollection> for MergedDocument {
    type Error = TourError;

    fn try_from(collection: FeatureCollection) -> Result<Self> {
        let mut doc = MergedDocument::default();

        for (i, feature) in collection.features.into_iter().enumerate() {
            let properties = serde_json::Value::Object(feature.properties.unwrap_or_default());

            match feature.geometry.map(|g| g.value) {
                Some(GeometryValue::LineString(positions)) => {
                    let p: PathProperties = serde_json::from_value(properties)
                        .map_err(|e| invalid(format!("path feature {}: {}", i, e)))?;
                    let coordinates = positions
                        .into_iter()
                        .map(Coordinate::try_from)
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(|e| invalid(format!("path {}: {}", p.key, e)))?;

                    let n = coordinates.len();
                    if p.timestamps.len() != n || p.elapsed_seconds.len() != n {
                        return Err(invalid(format!(
                            "path {} has {} coordinates, {} timestamps, {} elapsed values",
                            p.key,
                            n,
                            p.timestamps.len(),
                            p.elapsed_seconds.len()
                        )));
                    }
                    doc.paths.push(Path {
                        key: p.key,
                        name: p.name,
                        source_ids: p.source_ids,
                        coordinates,
                        timestamps: p.timestamps,
                        elapsed_seconds: p.elapsed_seconds,
                        duration_seconds: p.duration_seconds,
                        distance_km: p.distance_km,
                        timezone: p.timezone,
                        properties: p.extra,
                    });
                }
                Some(GeometryValue::Point(position)) => {
                    let w: WaypointProperties = serde_json::from_value(properties)
                        .map_err(|e| invalid(format!("waypoint feature {}: {}", i, e)))?;
                    let coordinate = Coordinate::try_from(position)
                        .map_err(|e| invalid(format!("waypoint {}: {}", w.source_id, e)))?;

                    doc.waypoints.push(MatchedWaypoint {
                        source_id: w.source_id,
                        kind: w.kind,
                        coordinate,
                        timestamp: w.timestamp,
                        path_key: w.path_key,
                        path_position_index: w.path_position_index,
                        fractional_location: w.fractional_location,
                        method: w.match_method,
                        distance_to_path_km: w.distance_to_path_km,
                        properties: w.extra,
                    });
                }
                Some(_) => {
                    return Err(invalid(format!(
                        "feature {} is neither a LineString nor a Point",
                        i
                    )));
                }
                None => {
                    return Err(invalid(format!("feature {} has no geometry", i)));
                }
            }
        }

        Ok(doc)
    }
}
