//! Read-only queries the playback front end runs against a tour document.
//!
//! The player walks each path in order, advancing a clock in elapsed seconds,
//! and pauses at vertices that carry a waypoint. These helpers answer exactly
//! those questions without the player re-deriving anything.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::MergedDocument;
use crate::{Bounds, Coordinate, MatchedWaypoint, Path};

/// Totals for a whole tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourSummary {
    pub path_count: usize,
    pub waypoint_count: usize,
    pub total_duration_seconds: f64,
    pub total_distance_km: f64,
    /// Extent of all paths; `None` for an empty document.
    pub bounds: Option<Bounds>,
}

impl MergedDocument {
    /// Totals across all paths, used to size the overall playback timeline.
    pub fn summary(&self) -> TourSummary {
        let bounds = self
            .paths
            .iter()
            .filter_map(Path::bounds)
            .reduce(|acc, b| acc.union(&b));

        TourSummary {
            path_count: self.paths.len(),
            waypoint_count: self.waypoints.len(),
            total_duration_seconds: self.paths.iter().map(|p| p.duration_seconds).sum(),
            total_distance_km: self.paths.iter().map(|p| p.distance_km).sum(),
            bounds,
        }
    }

    /// Look up a path by key.
    pub fn path(&self, key: &str) -> Option<&Path> {
        self.paths.iter().find(|p| p.key.as_str() == key)
    }

    /// Waypoints of one path keyed by vertex index.
    ///
    /// When several waypoints share a vertex the later one in the document
    /// replaces the earlier, since the player shows one image per vertex.
    pub fn waypoints_for_path(&self, key: &str) -> BTreeMap<usize, &MatchedWaypoint> {
        self.waypoints
            .iter()
            .filter(|w| w.path_key.as_str() == key)
            .map(|w| (w.path_position_index, w))
            .collect()
    }
}

impl Path {
    /// Bounding box of the path's coordinates.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_coordinates(&self.coordinates)
    }

    /// First vertex whose elapsed time is at least `seconds`, clamped to the
    /// last vertex. `None` for an empty path.
    pub fn vertex_index_at_elapsed(&self, seconds: f64) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let idx = self.elapsed_seconds.partition_point(|&e| e < seconds);
        Some(idx.min(self.len() - 1))
    }

    /// Elapsed time of each vertex as a fraction of the path duration.
    ///
    /// All zeros for a zero-duration path.
    pub fn elapsed_phases(&self) -> Vec<f64> {
        if self.duration_seconds <= 0.0 {
            return vec![0.0; self.elapsed_seconds.len()];
        }
        self.elapsed_seconds
            .iter()
            .map(|e| e / self.duration_seconds)
            .collect()
    }

    /// Position along the path at `seconds` of playback, interpolated linearly
    /// between the bracketing vertices. Times outside the path clamp to its
    /// ends.
    pub fn position_at_elapsed(&self, seconds: f64) -> Option<Coordinate> {
        let first = *self.coordinates.first()?;
        let idx = self.elapsed_seconds.partition_point(|&e| e < seconds);
        if idx == 0 {
            return Some(first);
        }
        if idx >= self.len() {
            return self.coordinates.last().copied();
        }

        let (a, b) = (&self.coordinates[idx - 1], &self.coordinates[idx]);
        let (ea, eb) = (self.elapsed_seconds[idx - 1], self.elapsed_seconds[idx]);
        let t = if eb > ea {
            ((seconds - ea) / (eb - ea)).clamp(0.0, 1.0)
        } else {
            1.0
        };

        Some(Coordinate {
            latitude: a.latitude + t * (b.latitude - a.latitude),
            longitude: a.longitude + t * (b.longitude - a.longitude),
            elevation: match (a.elevation, b.elevation) {
                (Some(x), Some(y)) => Some(x + t * (y - x)),
                _ => None,
            },
        })
    }
}
