//! # Tour Builder
//!
//! Reconciles GPS track logs and geotagged photos into one playback-ready tour
//! document.
//!
//! This library provides:
//! - Partitioning of recorded track segments by day or by session
//! - Assembly of one time-ordered path per partition, with distance, duration
//!   and per-vertex elapsed time
//! - Matching of photos to paths, by position when the photo has one and by
//!   timestamp otherwise
//! - A single merged GeoJSON document plus read-only playback queries over it
//!
//! ## Features
//!
//! - **`parallel`** - Match photos in parallel with rayon
//! - **`gpx`** - Read GPX track logs
//! - **`cli`** - Build the `tour-cli` binary
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use tour_builder::{
//!     build_tour, Coordinate, ImageKind, PointEvent, TourConfig, TrackFeature, TrackLine,
//! };
//!
//! let start = Utc.with_ymd_and_hms(2022, 5, 1, 8, 0, 0).unwrap();
//! let line = TrackLine::new(
//!     vec![Coordinate::new(19.4326, -99.1332), Coordinate::new(19.4400, -99.1332)],
//!     vec![start, start + chrono::Duration::minutes(10)],
//! );
//! let track = TrackFeature::line("morning.gpx", line);
//! let photo = PointEvent::new("IMG_0001.jpg", ImageKind::Flat)
//!     .with_coordinate(Coordinate::new(19.4360, -99.1330));
//!
//! let build = build_tour(vec![track], vec![photo], &TourConfig::default()).unwrap();
//! assert_eq!(build.document.paths.len(), 1);
//! assert_eq!(build.document.waypoints.len(), 1);
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Diagnostic, OptionExt, Result, TourError};

// Geographic utilities (distance, nearest point, bearing, bounds)
pub mod geo_utils;

// Instants, intervals, durations and timezone handling
pub mod temporal;
pub use temporal::LocalizedInstant;

// Keying and grouping of raw segments into partitions
pub mod collector;
pub use collector::{collect_features, collect_segments, CollectedSegments, Partition};

// Per-partition path assembly
pub mod assembler;
pub use assembler::{assemble_paths, AssembledPaths};

// Photo-to-path matching (spatial and temporal strategies)
pub mod matcher;
pub use matcher::{match_waypoints, MatchedWaypoints};

// Merged output document
pub mod document;
pub use document::{merge, MergedDocument};

// End-to-end pipeline
pub mod pipeline;
pub use pipeline::{build_tour, build_tour_from_segments, TourBuild};

// Read-only queries for the playback front end
pub mod playback;
pub use playback::TourSummary;

// Source format adapters
pub mod ingest;

/// Source properties carried through to the output untouched, such as a
/// photo's `iconSize` or a track's `videoId`.
pub type Properties = geojson::JsonObject;

// ============================================================================
// Core Types
// ============================================================================

/// A position with latitude, longitude and optional elevation.
///
/// Serialized as a GeoJSON position: `[lon, lat]` or `[lon, lat, ele]`.
///
/// # Example
/// ```
/// use tour_builder::Coordinate;
/// let point = Coordinate::new(19.4326, -99.1332); // Mexico City
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level, when the source recorded it.
    pub elevation: Option<f64>,
}

impl Coordinate {
    /// Create a new coordinate without elevation.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
        }
    }

    /// Attach an elevation in meters.
    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    /// Check if the coordinate is finite and within WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
            && self.elevation.map_or(true, f64::is_finite)
    }
}

impl TryFrom<Vec<f64>> for Coordinate {
    type Error = String;

    fn try_from(position: Vec<f64>) -> std::result::Result<Self, Self::Error> {
        match position.as_slice() {
            [lon, lat] => Ok(Coordinate::new(*lat, *lon)),
            [lon, lat, ele] => Ok(Coordinate::new(*lat, *lon).with_elevation(*ele)),
            other => Err(format!(
                "position must have 2 or 3 values, got {}",
                other.len()
            )),
        }
    }
}

impl From<Coordinate> for Vec<f64> {
    fn from(c: Coordinate) -> Self {
        match c.elevation {
            Some(ele) => vec![c.longitude, c.latitude, ele],
            None => vec![c.longitude, c.latitude],
        }
    }
}

/// Bounding box for a path or a whole tour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from coordinates. `None` for empty input.
    pub fn from_coordinates(points: &[Coordinate]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Grow these bounds to cover `other`.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// What kind of capture a point event is.
///
/// Only affects playback, except that panoramic timestamps are not trusted for
/// matching by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Flat,
    Panoramic,
}

impl ImageKind {
    /// Classify a capture by its camera make, e.g. `"Insta360"` is panoramic.
    ///
    /// A substring heuristic: any make containing `360` is treated as a
    /// panoramic camera.
    pub fn from_camera_make(make: &str) -> Self {
        if make.contains("360") {
            ImageKind::Panoramic
        } else {
            ImageKind::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Flat => "flat",
            ImageKind::Panoramic => "panoramic",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A photo or other point observation, before matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointEvent {
    /// Originating filename, used in diagnostics.
    pub source_id: String,
    pub kind: ImageKind,
    /// Position fix, when the capture had one.
    pub coordinate: Option<Coordinate>,
    /// Absolute capture instant, when known.
    pub timestamp: Option<DateTime<Utc>>,
    /// Unrecognised source properties, copied onto the matched waypoint.
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

impl PointEvent {
    /// Create a point event with neither position nor time.
    pub fn new(source_id: &str, kind: ImageKind) -> Self {
        Self {
            source_id: source_id.to_string(),
            kind,
            coordinate: None,
            timestamp: None,
            properties: Properties::new(),
        }
    }

    pub fn with_coordinate(mut self, coordinate: Coordinate) -> Self {
        self.coordinate = Some(coordinate);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

/// One contiguous recorded path fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    /// Originating file or record, for diagnostics and duplicate-key errors.
    pub source_id: String,
    pub name: Option<String>,
    /// Timezone designated by the source; the run default applies when absent.
    pub timezone: Option<Tz>,
    pub coordinates: Vec<Coordinate>,
    /// One absolute instant per coordinate, trusted to be non-decreasing.
    pub timestamps: Vec<DateTime<Utc>>,
    /// Properties of the feature the segment came from.
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

impl RawSegment {
    pub fn new(
        source_id: &str,
        coordinates: Vec<Coordinate>,
        timestamps: Vec<DateTime<Utc>>,
    ) -> Self {
        Self {
            source_id: source_id.to_string(),
            name: None,
            timezone: None,
            coordinates,
            timestamps,
            properties: Properties::new(),
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = Some(timezone);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    /// First recorded instant, if any.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    /// Last recorded instant, if any.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }
}

/// Coordinates and their instants for one line of a track feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackLine {
    pub coordinates: Vec<Coordinate>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl TrackLine {
    pub fn new(coordinates: Vec<Coordinate>, timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            coordinates,
            timestamps,
        }
    }
}

/// Geometry of a track feature as delivered by an ingestion adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackGeometry {
    LineString(TrackLine),
    MultiLineString(Vec<TrackLine>),
    /// Anything else the source contained (points, polygons, ...).
    Unsupported { geometry_type: String },
}

/// One track-like structure from a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFeature {
    pub source_id: String,
    pub name: Option<String>,
    pub timezone: Option<Tz>,
    pub geometry: TrackGeometry,
    /// Unrecognised source properties, copied onto the path.
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

impl TrackFeature {
    /// A single-line feature.
    pub fn line(source_id: &str, line: TrackLine) -> Self {
        Self {
            source_id: source_id.to_string(),
            name: None,
            timezone: None,
            geometry: TrackGeometry::LineString(line),
            properties: Properties::new(),
        }
    }

    /// A multi-line feature; each part becomes its own segment.
    pub fn multi_line(source_id: &str, lines: Vec<TrackLine>) -> Self {
        Self {
            source_id: source_id.to_string(),
            name: None,
            timezone: None,
            geometry: TrackGeometry::MultiLineString(lines),
            properties: Properties::new(),
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = Some(timezone);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

/// Identifier grouping raw segments into one path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(pub String);

impl PartitionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How segments are grouped into paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionMode {
    /// One path per calendar day (in the segment's timezone); segments of a
    /// day are concatenated in start order.
    Day,
    /// One path per segment, keyed by its start instant.
    Session,
}

impl FromStr for PartitionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(PartitionMode::Day),
            "session" => Ok(PartitionMode::Session),
            other => Err(format!("unknown partition mode '{}' (day|session)", other)),
        }
    }
}

/// What to do with two segments that start at the same instant in day mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail the run with [`TourError::DuplicateKey`].
    Reject,
    /// Keep both, in input order. Meant for merging re-exported copies.
    Concatenate,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(DuplicatePolicy::Reject),
            "concatenate" => Ok(DuplicatePolicy::Concatenate),
            other => Err(format!(
                "unknown duplicate policy '{}' (reject|concatenate)",
                other
            )),
        }
    }
}

/// Configuration for a tour-building run.
#[derive(Debug, Clone)]
pub struct TourConfig {
    /// Partitioning strategy. Default: [`PartitionMode::Day`]
    pub partition: PartitionMode,

    /// Timezone for sources that do not designate one. Used for day keys and
    /// stored on each path for local-time rendering. Default: UTC
    pub default_timezone: Tz,

    /// Same-start-instant handling in day mode. Session mode always rejects.
    /// Default: [`DuplicatePolicy::Reject`]
    pub duplicate_policy: DuplicatePolicy,

    /// Drop segments with non-finite or out-of-range coordinates.
    /// Default: true
    pub validate_coordinates: bool,

    /// Use panoramic capture timestamps for temporal matching. Panoramic
    /// cameras tend to have unset clocks. Default: false
    pub trust_panoramic_timestamps: bool,
}

impl Default for TourConfig {
    fn default() -> Self {
        Self {
            partition: PartitionMode::Day,
            default_timezone: Tz::UTC,
            duplicate_policy: DuplicatePolicy::Reject,
            validate_coordinates: true,
            trust_panoramic_timestamps: false,
        }
    }
}

impl TourConfig {
    /// Config with a partition mode and default timezone, other fields default.
    pub fn new(partition: PartitionMode, default_timezone: Tz) -> Self {
        Self {
            partition,
            default_timezone,
            ..Self::default()
        }
    }
}

/// The assembled, time-ordered trajectory for one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub key: PartitionKey,
    /// Name of the earliest segment, when the source had one.
    pub name: Option<String>,
    /// Sources of the constituent segments, in concatenation order.
    pub source_ids: Vec<String>,
    pub coordinates: Vec<Coordinate>,
    pub timestamps: Vec<DateTime<Utc>>,
    /// Seconds since the first vertex; starts at 0, never decreases.
    pub elapsed_seconds: Vec<f64>,
    pub duration_seconds: f64,
    pub distance_km: f64,
    pub timezone: Tz,
    /// Source properties of the earliest segment.
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

impl Path {
    /// First recorded instant.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    /// Exclusive end of the path's time span: start + duration.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.start_time()
            .map(|start| start + temporal::seconds_to_duration(self.duration_seconds))
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

/// Which strategy associated a waypoint with its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Spatial,
    Temporal,
}

/// A point event associated with a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedWaypoint {
    pub source_id: String,
    pub kind: ImageKind,
    /// The event's own coordinate, or the matched vertex for temporal matches.
    pub coordinate: Coordinate,
    pub timestamp: Option<DateTime<Utc>>,
    pub path_key: PartitionKey,
    /// Index of the nearest vertex in the path's coordinate/timestamp arrays.
    pub path_position_index: usize,
    /// Normalized distance along the path in [0, 1]; spatial matches only.
    pub fractional_location: Option<f64>,
    pub method: MatchMethod,
    /// Distance from the event to the path; spatial matches only.
    pub distance_to_path_km: Option<f64>,
    /// Source properties of the point event.
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}
