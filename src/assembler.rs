//! Per-partition path assembly.
//!
//! Within a partition, segments are stable-sorted by their first instant
//! (ties keep input order) and concatenated into one [`Path`]. The path is
//! then enriched with per-vertex elapsed seconds, total duration and
//! great-circle distance, which is all the playback side needs for
//! variable-speed animation.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{debug, info};

use crate::collector::{CollectedSegments, Partition};
use crate::error::{record, Diagnostic};
use crate::geo_utils::polyline_length;
use crate::temporal::elapsed_series;
use crate::{Coordinate, PartitionKey, Path, Properties};

/// Assembled paths, ordered by start instant, plus every diagnostic so far.
#[derive(Debug, Clone, Default)]
pub struct AssembledPaths {
    pub paths: Vec<Path>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Build one path per non-empty partition.
///
/// Diagnostics from collection are carried over so a run has a single list.
pub fn assemble_paths(collected: CollectedSegments) -> AssembledPaths {
    let mut diagnostics = collected.diagnostics;
    let mut paths: Vec<Path> = collected
        .partitions
        .into_values()
        .filter_map(|partition| assemble_partition(partition, &mut diagnostics))
        .collect();

    paths.sort_by(|a, b| {
        a.start_time()
            .cmp(&b.start_time())
            .then_with(|| a.key.cmp(&b.key))
    });

    info!(
        "[assembler] Assembled {} paths, {:.1} km, {:.0} s total",
        paths.len(),
        paths.iter().map(|p| p.distance_km).sum::<f64>(),
        paths.iter().map(|p| p.duration_seconds).sum::<f64>()
    );

    AssembledPaths { paths, diagnostics }
}

/// Sort and concatenate one partition's segments. `None` when it is empty.
fn assemble_partition(partition: Partition, diagnostics: &mut Vec<Diagnostic>) -> Option<Path> {
    let Partition {
        key,
        timezone,
        mut segments,
    } = partition;

    // Stable: equal start instants keep input order
    segments.sort_by_key(|s| s.start_time());

    let name = segments.first()?.name.clone();
    let properties = segments.first()?.properties.clone();
    let point_count: usize = segments.iter().map(|s| s.coordinates.len()).sum();

    let mut coordinates = Vec::with_capacity(point_count);
    let mut timestamps = Vec::with_capacity(point_count);
    let mut source_ids = Vec::with_capacity(segments.len());
    let mut latest_end: Option<DateTime<Utc>> = None;

    for segment in segments {
        if let (Some(end), Some(start)) = (latest_end, segment.start_time()) {
            if start < end {
                record(
                    diagnostics,
                    Diagnostic::OverlappingSegments {
                        key: key.to_string(),
                        source_id: segment.source_id.clone(),
                    },
                );
            }
        }
        latest_end = latest_end.max(segment.end_time());

        coordinates.extend(segment.coordinates);
        timestamps.extend(segment.timestamps);
        source_ids.push(segment.source_id);
    }

    if coordinates.is_empty() {
        return None;
    }

    debug!(
        "[assembler] {} <- {} segments, {} points",
        key,
        source_ids.len(),
        coordinates.len()
    );

    let mut path = build_path(key, name, source_ids, coordinates, timestamps, timezone);
    path.properties = properties;
    Some(path)
}

/// Enrich concatenated coordinates and instants into a [`Path`].
///
/// Elapsed seconds are clamped to their running maximum so overlapping input
/// cannot make playback time run backwards; the duration is the final elapsed
/// value, which equals `last - first` for well-ordered input.
pub fn build_path(
    key: PartitionKey,
    name: Option<String>,
    source_ids: Vec<String>,
    coordinates: Vec<Coordinate>,
    timestamps: Vec<DateTime<Utc>>,
    timezone: Tz,
) -> Path {
    let mut elapsed_seconds = elapsed_series(&timestamps);
    let mut running = 0.0_f64;
    for e in elapsed_seconds.iter_mut() {
        running = running.max(*e);
        *e = running;
    }

    let duration_seconds = elapsed_seconds.last().copied().unwrap_or(0.0);
    let distance_km = polyline_length(&coordinates) / 1000.0;

    Path {
        key,
        name,
        source_ids,
        coordinates,
        timestamps,
        elapsed_seconds,
        duration_seconds,
        distance_km,
        timezone,
        properties: Properties::new(),
    }
}
