//! Keying and grouping of raw segments into partitions.
//!
//! Every segment gets a [`PartitionKey`] from its first instant:
//!
//! - [`PartitionMode::Session`]: the instant itself, so every segment is its
//!   own partition and any collision is fatal.
//! - [`PartitionMode::Day`]: the local calendar date, so segments of the same
//!   day share a partition. Two segments starting at the same instant are still
//!   rejected unless [`DuplicatePolicy::Concatenate`] is configured.
//!
//! Segments that cannot form a line are dropped with a diagnostic, as are
//! track features whose geometry is neither a line nor a multi-line.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono_tz::Tz;
use log::{debug, info};

use crate::error::{record, Diagnostic, Result, TourError};
use crate::temporal::{partition_date, session_stamp};
use crate::{
    DuplicatePolicy, PartitionKey, PartitionMode, RawSegment, TourConfig, TrackFeature,
    TrackGeometry,
};

/// Segments sharing one partition key.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub key: PartitionKey,
    /// Zone of the first segment that claimed the key.
    pub timezone: Tz,
    /// Segments in input order; the assembler sorts them.
    pub segments: Vec<RawSegment>,
}

/// Output of the collector: partitions in key order plus what was dropped.
#[derive(Debug, Clone, Default)]
pub struct CollectedSegments {
    pub partitions: BTreeMap<PartitionKey, Partition>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectedSegments {
    pub fn segment_count(&self) -> usize {
        self.partitions.values().map(|p| p.segments.len()).sum()
    }
}

/// Expand track features into segments and collect them.
///
/// Unsupported geometry is skipped with a warning, never fatal.
pub fn collect_features(features: Vec<TrackFeature>, config: &TourConfig) -> Result<CollectedSegments> {
    let mut diagnostics = Vec::new();
    let segments = expand_features(features, &mut diagnostics);

    let mut collected = collect_segments(segments, config)?;
    diagnostics.append(&mut collected.diagnostics);
    collected.diagnostics = diagnostics;
    Ok(collected)
}

/// Turn track features into raw segments, one per line.
///
/// Parts of a multi-line feature get `#<index>` appended to their source id
/// so diagnostics can point at the exact part.
pub fn expand_features(features: Vec<TrackFeature>, diagnostics: &mut Vec<Diagnostic>) -> Vec<RawSegment> {
    let mut segments = Vec::new();

    for feature in features {
        let lines = match feature.geometry {
            TrackGeometry::LineString(line) => vec![(feature.source_id.clone(), line)],
            TrackGeometry::MultiLineString(lines) => {
                let multi = lines.len() > 1;
                lines
                    .into_iter()
                    .enumerate()
                    .map(|(i, line)| {
                        let id = if multi {
                            format!("{}#{}", feature.source_id, i)
                        } else {
                            feature.source_id.clone()
                        };
                        (id, line)
                    })
                    .collect()
            }
            TrackGeometry::Unsupported { geometry_type } => {
                record(
                    diagnostics,
                    Diagnostic::UnsupportedGeometry {
                        source_id: feature.source_id.clone(),
                        geometry_type,
                    },
                );
                continue;
            }
        };

        for (source_id, line) in lines {
            segments.push(RawSegment {
                source_id,
                name: feature.name.clone(),
                timezone: feature.timezone,
                coordinates: line.coordinates,
                timestamps: line.timestamps,
                properties: feature.properties.clone(),
            });
        }
    }

    segments
}

/// Compute the partition key of a segment. `None` when it has no timestamps.
pub fn partition_key(segment: &RawSegment, mode: PartitionMode, default_timezone: Tz) -> Option<PartitionKey> {
    let start = segment.start_time()?;
    let key = match mode {
        PartitionMode::Session => session_stamp(start),
        PartitionMode::Day => partition_date(start, segment.timezone.unwrap_or(default_timezone)),
    };
    Some(PartitionKey(key))
}

/// Group segments by partition key.
///
/// Fails with [`TourError::DuplicateKey`] when two segments collide where the
/// configuration does not allow it. Invalid segments are dropped with
/// [`Diagnostic::InvalidGeometry`].
pub fn collect_segments(segments: Vec<RawSegment>, config: &TourConfig) -> Result<CollectedSegments> {
    let mut partitions: BTreeMap<PartitionKey, Partition> = BTreeMap::new();
    let mut diagnostics = Vec::new();
    let total = segments.len();

    for segment in segments {
        if let Some(reason) = invalid_reason(&segment, config.validate_coordinates) {
            record(
                &mut diagnostics,
                Diagnostic::InvalidGeometry {
                    source_id: segment.source_id.clone(),
                    reason,
                },
            );
            continue;
        }

        // Validation guarantees at least two timestamps
        let Some(key) = partition_key(&segment, config.partition, config.default_timezone) else {
            continue;
        };
        let timezone = segment.timezone.unwrap_or(config.default_timezone);

        match partitions.entry(key) {
            Entry::Vacant(slot) => {
                debug!(
                    "[collector] Adding key {} from {}",
                    slot.key(),
                    segment.source_id
                );
                let key = slot.key().clone();
                slot.insert(Partition {
                    key,
                    timezone,
                    segments: vec![segment],
                });
            }
            Entry::Occupied(mut slot) => {
                let partition = slot.get_mut();
                check_collision(partition, &segment, config)?;
                debug!(
                    "[collector] Appending {} to key {}",
                    segment.source_id, partition.key
                );
                partition.segments.push(segment);
            }
        }
    }

    info!(
        "[collector] Collected {} of {} segments into {} partitions",
        partitions.values().map(|p| p.segments.len()).sum::<usize>(),
        total,
        partitions.len()
    );

    Ok(CollectedSegments {
        partitions,
        diagnostics,
    })
}

/// Decide whether `segment` may join an already-claimed partition.
fn check_collision(partition: &Partition, segment: &RawSegment, config: &TourConfig) -> Result<()> {
    match config.partition {
        PartitionMode::Session => {
            let first = &partition.segments[0];
            Err(TourError::DuplicateKey {
                key: partition.key.to_string(),
                first_source: first.source_id.clone(),
                second_source: segment.source_id.clone(),
            })
        }
        PartitionMode::Day => {
            if config.duplicate_policy == DuplicatePolicy::Concatenate {
                return Ok(());
            }
            let start = segment.start_time();
            match partition.segments.iter().find(|s| s.start_time() == start) {
                Some(existing) => Err(TourError::DuplicateKey {
                    key: match start {
                        Some(t) => format!("{} (start {})", partition.key, session_stamp(t)),
                        None => partition.key.to_string(),
                    },
                    first_source: existing.source_id.clone(),
                    second_source: segment.source_id.clone(),
                }),
                None => Ok(()),
            }
        }
    }
}

/// Why a segment cannot be used, if it cannot.
fn invalid_reason(segment: &RawSegment, validate_coordinates: bool) -> Option<String> {
    let n = segment.coordinates.len();
    if n < 2 {
        return Some(format!("has {} coordinates, at least 2 required", n));
    }
    if segment.timestamps.len() != n {
        return Some(format!(
            "has {} coordinates but {} timestamps",
            n,
            segment.timestamps.len()
        ));
    }
    if validate_coordinates {
        if let Some(i) = segment.coordinates.iter().position(|c| !c.is_valid()) {
            return Some(format!("coordinate {} is out of range", i));
        }
    }
    None
}
