//! End-to-end tour building.
//!
//! ```text
//! track features -> collector -> assembler -> paths ─┐
//!                                                    ├-> matcher -> merger -> document
//!                                   point events ────┘
//! ```
//!
//! The run is a pure batch transform: the same inputs always give the same
//! document. Structural problems (duplicate keys, ambiguous time matches, no
//! paths at all) abort the run; per-segment and per-photo problems are
//! collected as diagnostics.

use log::info;

use crate::assembler::assemble_paths;
use crate::collector::{collect_features, collect_segments, CollectedSegments};
use crate::document::{merge, MergedDocument};
use crate::error::{Diagnostic, Result, TourError};
use crate::matcher::match_waypoints;
use crate::{PointEvent, RawSegment, TourConfig, TrackFeature};

/// A finished run: the document and everything that was dropped on the way.
#[derive(Debug, Clone)]
pub struct TourBuild {
    pub document: MergedDocument,
    pub diagnostics: Vec<Diagnostic>,
}

/// Build a tour from adapter-level track features and point events.
pub fn build_tour(
    features: Vec<TrackFeature>,
    points: Vec<PointEvent>,
    config: &TourConfig,
) -> Result<TourBuild> {
    let collected = collect_features(features, config)?;
    finish(collected, points, config)
}

/// Build a tour from already-split raw segments.
pub fn build_tour_from_segments(
    segments: Vec<RawSegment>,
    points: Vec<PointEvent>,
    config: &TourConfig,
) -> Result<TourBuild> {
    let collected = collect_segments(segments, config)?;
    finish(collected, points, config)
}

fn finish(collected: CollectedSegments, points: Vec<PointEvent>, config: &TourConfig) -> Result<TourBuild> {
    let assembled = assemble_paths(collected);
    if assembled.paths.is_empty() {
        return Err(TourError::NoPaths);
    }

    let mut diagnostics = assembled.diagnostics;
    let matched = match_waypoints(&assembled.paths, &points, config)?;
    diagnostics.extend(matched.diagnostics);

    let document = merge(assembled.paths, matched.waypoints);

    info!(
        "[pipeline] Tour ready: {} paths, {} waypoints, {} diagnostics",
        document.paths.len(),
        document.waypoints.len(),
        diagnostics.len()
    );

    Ok(TourBuild {
        document,
        diagnostics,
    })
}
