//! Unified error handling for the tour builder.
//!
//! Two kinds of problems come out of a run:
//!
//! - [`TourError`]: fatal. The run stops and no document is produced.
//! - [`Diagnostic`]: recoverable. The offending segment or photo is dropped,
//!   the diagnostic is logged and collected, and processing continues.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal error for tour-building operations.
#[derive(Debug, Error)]
pub enum TourError {
    /// A path or segment has too few coordinates for the geometry operation.
    #[error("'{context}' has {point_count} coordinates, at least 2 required")]
    InvalidGeometry { context: String, point_count: usize },

    /// Two segments claimed the same partition key.
    #[error("Found duplicate key {key} in segments from {first_source} and {second_source}")]
    DuplicateKey {
        key: String,
        first_source: String,
        second_source: String,
    },

    /// A timestamp-only photo falls inside more than one path's time span.
    #[error("Photo '{source_id}' at {timestamp} falls inside several paths: {}", .candidates.join(", "))]
    AmbiguousTimeMatch {
        source_id: String,
        timestamp: String,
        candidates: Vec<String>,
    },

    /// Nothing to match against: no valid track segments survived collection.
    #[error("No paths were assembled from the track input")]
    NoPaths,

    /// A required input file does not exist.
    #[error("Input file not found: {}", .path.display())]
    MissingInputFile { path: PathBuf },

    #[error("Invalid timestamp '{value}': {message}")]
    InvalidTimestamp { value: String, message: String },

    #[error("Unknown timezone '{name}'")]
    UnknownTimezone { name: String },

    /// A wall-clock time that was skipped by a DST transition.
    #[error("Local time {local} does not exist in {timezone}")]
    NonexistentLocalTime { local: String, timezone: String },

    /// A serialized tour document could not be mapped back to paths and waypoints.
    #[error("Invalid tour document: {message}")]
    InvalidDocument { message: String },

    /// An ingestion adapter rejected its input.
    #[error("Failed to ingest '{source_id}': {message}")]
    Ingest { source_id: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[cfg(feature = "gpx")]
    #[error("GPX parse error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
}

/// Result type alias for tour-building operations.
pub type Result<T> = std::result::Result<T, TourError>;

/// Extension trait for converting `Option` into [`TourError`].
pub trait OptionExt<T> {
    /// Convert `None` into an [`TourError::InvalidGeometry`] error.
    fn ok_or_invalid_geometry(self, context: &str, point_count: usize) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid_geometry(self, context: &str, point_count: usize) -> Result<T> {
        self.ok_or_else(|| TourError::InvalidGeometry {
            context: context.to_string(),
            point_count,
        })
    }
}

/// A recoverable problem recorded during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Segment dropped: too few coordinates, mismatched timestamps or bad coordinates.
    InvalidGeometry { source_id: String, reason: String },
    /// Track feature skipped because its geometry is neither a line nor a multi-line.
    UnsupportedGeometry {
        source_id: String,
        geometry_type: String,
    },
    /// A segment starts before the previous segment of the same partition ends.
    OverlappingSegments { key: String, source_id: String },
    /// Photo dropped: neither a coordinate nor a timestamp.
    NoPositionData { source_id: String },
    /// Photo dropped: its timestamp is outside every path's time span.
    NoEnclosingPath { source_id: String, timestamp: String },
    /// Photo dropped: no coordinate, and its kind's timestamps are not trusted.
    UntrustedTimestamp { source_id: String, kind: String },
}

impl Diagnostic {
    /// Identifier of the segment or photo this diagnostic is about.
    pub fn source_id(&self) -> &str {
        match self {
            Diagnostic::InvalidGeometry { source_id, .. }
            | Diagnostic::UnsupportedGeometry { source_id, .. }
            | Diagnostic::OverlappingSegments { source_id, .. }
            | Diagnostic::NoPositionData { source_id }
            | Diagnostic::NoEnclosingPath { source_id, .. }
            | Diagnostic::UntrustedTimestamp { source_id, .. } => source_id,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::InvalidGeometry { source_id, reason } => {
                write!(f, "Skipping segment from '{}': {}", source_id, reason)
            }
            Diagnostic::UnsupportedGeometry {
                source_id,
                geometry_type,
            } => {
                write!(
                    f,
                    "Ignoring unknown geometry type {} in '{}'",
                    geometry_type, source_id
                )
            }
            Diagnostic::OverlappingSegments { key, source_id } => {
                write!(
                    f,
                    "Segment from '{}' overlaps the previous segment of {}",
                    source_id, key
                )
            }
            Diagnostic::NoPositionData { source_id } => {
                write!(f, "Dropping '{}': no coordinate and no timestamp", source_id)
            }
            Diagnostic::NoEnclosingPath {
                source_id,
                timestamp,
            } => {
                write!(
                    f,
                    "Dropping '{}': no path covers {}",
                    source_id, timestamp
                )
            }
            Diagnostic::UntrustedTimestamp { source_id, kind } => {
                write!(
                    f,
                    "Dropping '{}': no coordinate and {} timestamps are not used for matching",
                    source_id, kind
                )
            }
        }
    }
}

/// Log a diagnostic at warn level and record it.
pub(crate) fn record(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    log::warn!("{}", diagnostic);
    diagnostics.push(diagnostic);
}
