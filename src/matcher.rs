//! Photo-to-path matching.
//!
//! Each point event is matched by exactly one strategy, chosen by what data
//! it carries:
//!
//! - **Spatial** (has a coordinate): the path at minimum great-circle distance
//!   wins, ties going to the earlier path. The nearest location on that path
//!   gives the vertex index and the fractional position. Never rejects.
//! - **Temporal** (no coordinate, trusted timestamp): the path whose
//!   half-open `[start, start + duration)` span contains the timestamp. The
//!   vertex is the first one whose elapsed time reaches the event's, and the
//!   event's coordinate is back-filled from it. No containing path drops the
//!   event; more than one aborts the run, since overlapping recordings make
//!   any choice a silent guess.
//! - Neither: dropped.
//!
//! Candidate paths for the temporal strategy come from an R-tree over path
//! time spans.

use chrono::{DateTime, Utc};
use log::{debug, info};
use rstar::{RTree, RTreeObject, AABB};

use crate::error::{record, Diagnostic, Result, TourError};
use crate::geo_utils::{distance_point_to_path, nearest_point_on_path};
use crate::temporal::{elapsed_seconds, interval_contains, iso8601};
use crate::{
    Coordinate, ImageKind, MatchMethod, MatchedWaypoint, Path, PointEvent, TourConfig,
};

/// Matched waypoints in input order, plus the events that were dropped.
#[derive(Debug, Clone, Default)]
pub struct MatchedWaypoints {
    pub waypoints: Vec<MatchedWaypoint>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of matching a single event.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(MatchedWaypoint),
    Dropped(Diagnostic),
}

// ============================================================================
// Time-span index
// ============================================================================

/// Time span of one path, indexed as a degenerate 2D box.
#[derive(Debug, Clone, Copy)]
struct PathSpan {
    path_idx: usize,
    start: f64,
    end: f64,
}

impl RTreeObject for PathSpan {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.start, 0.0], [self.end, 0.0])
    }
}

/// Finds the paths whose time span contains an instant.
pub struct TimeIndex<'a> {
    paths: &'a [Path],
    tree: RTree<PathSpan>,
}

impl<'a> TimeIndex<'a> {
    pub fn new(paths: &'a [Path]) -> Self {
        let spans: Vec<PathSpan> = paths
            .iter()
            .enumerate()
            .filter_map(|(path_idx, path)| {
                let start = path.start_time()?;
                let end = path.end_time()?;
                // One second of padding so float rounding cannot hide a
                // boundary hit; exact containment is checked afterwards.
                Some(PathSpan {
                    path_idx,
                    start: unix_seconds(start) - 1.0,
                    end: unix_seconds(end) + 1.0,
                })
            })
            .collect();

        Self {
            paths,
            tree: RTree::bulk_load(spans),
        }
    }

    /// Indices of paths with `start <= instant < start + duration`, ascending.
    pub fn containing(&self, instant: DateTime<Utc>) -> Vec<usize> {
        let t = unix_seconds(instant);
        let probe = AABB::from_point([t, 0.0]);

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&probe)
            .map(|span| span.path_idx)
            .filter(|&idx| {
                let path = &self.paths[idx];
                match (path.start_time(), path.end_time()) {
                    (Some(start), Some(end)) => interval_contains(start, end, instant),
                    _ => false,
                }
            })
            .collect();
        hits.sort_unstable();
        hits
    }
}

fn unix_seconds(instant: DateTime<Utc>) -> f64 {
    instant.timestamp() as f64 + f64::from(instant.timestamp_subsec_nanos()) / 1e9
}

// ============================================================================
// Matching
// ============================================================================

/// Match every event against the paths.
///
/// Fails with [`TourError::NoPaths`] when `paths` is empty and with
/// [`TourError::AmbiguousTimeMatch`] on the first (in input order) event whose
/// timestamp falls inside several paths. Dropped events are recorded as
/// diagnostics.
pub fn match_waypoints(
    paths: &[Path],
    events: &[PointEvent],
    config: &TourConfig,
) -> Result<MatchedWaypoints> {
    if paths.is_empty() {
        return Err(TourError::NoPaths);
    }

    let index = TimeIndex::new(paths);

    #[cfg(feature = "parallel")]
    let outcomes: Vec<Result<MatchOutcome>> = {
        use rayon::prelude::*;
        events
            .par_iter()
            .map(|event| match_event(paths, &index, event, config))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<Result<MatchOutcome>> = events
        .iter()
        .map(|event| match_event(paths, &index, event, config))
        .collect();

    let mut result = MatchedWaypoints::default();
    for outcome in outcomes {
        match outcome? {
            MatchOutcome::Matched(waypoint) => result.waypoints.push(waypoint),
            MatchOutcome::Dropped(diagnostic) => record(&mut result.diagnostics, diagnostic),
        }
    }

    let spatial = result
        .waypoints
        .iter()
        .filter(|w| w.method == MatchMethod::Spatial)
        .count();
    info!(
        "[matcher] Matched {} of {} events ({} spatial, {} temporal), dropped {}",
        result.waypoints.len(),
        events.len(),
        spatial,
        result.waypoints.len() - spatial,
        result.diagnostics.len()
    );

    Ok(result)
}

/// Match one event, choosing the strategy by the data it carries.
pub fn match_event(
    paths: &[Path],
    index: &TimeIndex<'_>,
    event: &PointEvent,
    config: &TourConfig,
) -> Result<MatchOutcome> {
    match (event.coordinate, event.timestamp) {
        (Some(coordinate), _) => match_spatial(paths, event, coordinate).map(MatchOutcome::Matched),
        (None, Some(timestamp)) => {
            if !trusts_timestamp(event.kind, config) {
                return Ok(MatchOutcome::Dropped(Diagnostic::UntrustedTimestamp {
                    source_id: event.source_id.clone(),
                    kind: event.kind.to_string(),
                }));
            }
            match_temporal(paths, index, event, timestamp)
        }
        (None, None) => Ok(MatchOutcome::Dropped(Diagnostic::NoPositionData {
            source_id: event.source_id.clone(),
        })),
    }
}

fn trusts_timestamp(kind: ImageKind, config: &TourConfig) -> bool {
    match kind {
        ImageKind::Flat => true,
        ImageKind::Panoramic => config.trust_panoramic_timestamps,
    }
}

/// Index and distance (km) of the path closest to `point`.
///
/// Single linear scan; on equal distance the earlier path wins.
pub fn nearest_path(paths: &[Path], point: &Coordinate) -> Result<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, path) in paths.iter().enumerate() {
        let d = distance_point_to_path(point, &path.coordinates)?;
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((i, d)),
        }
    }
    best.ok_or(TourError::NoPaths)
}

fn match_spatial(paths: &[Path], event: &PointEvent, coordinate: Coordinate) -> Result<MatchedWaypoint> {
    let (path_idx, distance_km) = nearest_path(paths, &coordinate)?;
    let path = &paths[path_idx];
    let nearest = nearest_point_on_path(&coordinate, &path.coordinates)?;

    debug!(
        "[matcher] {} -> {} vertex {} ({:.3} km off, {:.3} along)",
        event.source_id, path.key, nearest.vertex_index, distance_km, nearest.fractional_location
    );

    Ok(MatchedWaypoint {
        source_id: event.source_id.clone(),
        kind: event.kind,
        coordinate,
        timestamp: event.timestamp,
        path_key: path.key.clone(),
        path_position_index: nearest.vertex_index,
        fractional_location: Some(nearest.fractional_location),
        method: MatchMethod::Spatial,
        distance_to_path_km: Some(distance_km),
        properties: event.properties.clone(),
    })
}

fn match_temporal(
    paths: &[Path],
    index: &TimeIndex<'_>,
    event: &PointEvent,
    timestamp: DateTime<Utc>,
) -> Result<MatchOutcome> {
    let candidates = index.containing(timestamp);

    match candidates.as_slice() {
        [] => Ok(MatchOutcome::Dropped(Diagnostic::NoEnclosingPath {
            source_id: event.source_id.clone(),
            timestamp: iso8601(timestamp),
        })),
        [only] => {
            let path = &paths[*only];
            let vertex = vertex_at_or_after(path, timestamp);

            debug!(
                "[matcher] {} -> {} vertex {} by time",
                event.source_id, path.key, vertex
            );

            Ok(MatchOutcome::Matched(MatchedWaypoint {
                source_id: event.source_id.clone(),
                kind: event.kind,
                coordinate: path.coordinates[vertex],
                timestamp: Some(timestamp),
                path_key: path.key.clone(),
                path_position_index: vertex,
                fractional_location: None,
                method: MatchMethod::Temporal,
                distance_to_path_km: None,
                properties: event.properties.clone(),
            }))
        }
        many => Err(TourError::AmbiguousTimeMatch {
            source_id: event.source_id.clone(),
            timestamp: iso8601(timestamp),
            candidates: many.iter().map(|&i| paths[i].key.to_string()).collect(),
        }),
    }
}

/// First vertex whose elapsed time is at least the instant's, clamped to the
/// last vertex.
fn vertex_at_or_after(path: &Path, instant: DateTime<Utc>) -> usize {
    let Some(start) = path.start_time() else {
        return 0;
    };
    let target = elapsed_seconds(start, instant);
    let idx = path.elapsed_seconds.partition_point(|&e| e < target);
    idx.min(path.len().saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::build_path;
    use crate::PartitionKey;
    use chrono::Duration;
    use chrono_tz::Tz;

    fn at(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    fn path(key: &str, start: &str, lng: f64, minutes: i64) -> Path {
        let t0 = at(start);
        let coordinates: Vec<Coordinate> = (0..=minutes)
            .map(|i| Coordinate::new(19.0 + i as f64 * 0.001, lng))
            .collect();
        let timestamps = (0..=minutes).map(|i| t0 + Duration::minutes(i)).collect();
        build_path(
            PartitionKey(key.to_string()),
            None,
            vec![format!("{key}.gpx")],
            coordinates,
            timestamps,
            Tz::UTC,
        )
    }

    #[test]
    fn test_time_index_is_half_open() {
        let paths = vec![path("a", "2022-05-01T08:00:00Z", -99.0, 10)];
        let index = TimeIndex::new(&paths);
        assert_eq!(index.containing(at("2022-05-01T08:00:00Z")), vec![0]);
        assert_eq!(index.containing(at("2022-05-01T08:09:59Z")), vec![0]);
        assert!(index.containing(at("2022-05-01T08:10:00Z")).is_empty());
    }

    #[test]
    fn test_temporal_vertex_rounds_up() {
        let paths = vec![path("a", "2022-05-01T08:00:00Z", -99.0, 10)];
        let event = PointEvent::new("IMG_1.jpg", ImageKind::Flat)
            .with_timestamp(at("2022-05-01T08:03:30Z"));
        let matched = match_waypoints(&paths, &[event], &TourConfig::default()).unwrap();
        let w = &matched.waypoints[0];
        assert_eq!(w.path_position_index, 4);
        assert_eq!(w.coordinate, paths[0].coordinates[4]);
        assert_eq!(w.method, MatchMethod::Temporal);
        assert!(w.fractional_location.is_none());
    }

    #[test]
    fn test_panoramic_timestamp_not_trusted_by_default() {
        let paths = vec![path("a", "2022-05-01T08:00:00Z", -99.0, 10)];
        let event = PointEvent::new("PANO_1.jpg", ImageKind::Panoramic)
            .with_timestamp(at("2022-05-01T08:03:00Z"));

        let matched = match_waypoints(&paths, &[event.clone()], &TourConfig::default()).unwrap();
        assert!(matched.waypoints.is_empty());
        assert!(matches!(
            matched.diagnostics[0],
            Diagnostic::UntrustedTimestamp { .. }
        ));

        let trusting = TourConfig {
            trust_panoramic_timestamps: true,
            ..TourConfig::default()
        };
        let matched = match_waypoints(&paths, &[event], &trusting).unwrap();
        assert_eq!(matched.waypoints.len(), 1);
    }

    #[test]
    fn test_spatial_tie_goes_to_first_path() {
        // Same geometry twice: equal distances
        let paths = vec![
            path("first", "2022-05-01T08:00:00Z", -99.0, 5),
            path("second", "2022-05-02T08:00:00Z", -99.0, 5),
        ];
        let (idx, _) = nearest_path(&paths, &Coordinate::new(19.002, -98.999)).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_no_paths_is_fatal() {
        let event = PointEvent::new("IMG_1.jpg", ImageKind::Flat)
            .with_coordinate(Coordinate::new(19.0, -99.0));
        assert!(matches!(
            match_waypoints(&[], &[event], &TourConfig::default()),
            Err(TourError::NoPaths)
        ));
    }
}
