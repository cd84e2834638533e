//! Source format adapters.
//!
//! Adapters turn files into the canonical [`TrackFeature`] and [`PointEvent`]
//! records; nothing past this module knows about file formats.
//!
//! - [`geojson`]: togeojson-style feature collections (tracks and photos)
//! - `gpx`: GPX track logs (feature `gpx`)

use std::fs;
use std::path::{Path as FsPath, PathBuf};

use chrono_tz::Tz;
use log::info;

use crate::error::{Result, TourError};
use crate::{PointEvent, TrackFeature};

pub mod geojson;
pub use self::geojson::{GeoJsonPointFile, GeoJsonTrackFile};

#[cfg(feature = "gpx")]
pub mod gpx;
#[cfg(feature = "gpx")]
pub use self::gpx::GpxTrackFile;

/// Anything that yields track features.
pub trait TrackSource {
    fn read_tracks(&self) -> Result<Vec<TrackFeature>>;
}

/// Anything that yields point events.
pub trait PointSource {
    fn read_points(&self) -> Result<Vec<PointEvent>>;
}

/// Read every supported track file in `dir`, in file-name order.
///
/// `.geojson`/`.json` files are always read; `.gpx` files need the `gpx`
/// feature. Other files are ignored. Offset-less GeoJSON times of features
/// without their own `timezone` property are read in `timezone`; GPX times
/// are always absolute.
pub fn read_track_dir(dir: &FsPath, timezone: Tz) -> Result<Vec<TrackFeature>> {
    if !dir.is_dir() {
        return Err(TourError::MissingInputFile {
            path: dir.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let mut features = Vec::new();
    for file in files {
        let ext = file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let mut read = match ext.as_deref() {
            Some("geojson") | Some("json") => {
                GeoJsonTrackFile::new(&file, timezone).read_tracks()?
            }
            #[cfg(feature = "gpx")]
            Some("gpx") => GpxTrackFile::new(&file, None).read_tracks()?,
            _ => {
                info!(
                    "[ingest] Ignoring file {} since it is not a supported track format",
                    file.display()
                );
                continue;
            }
        };
        info!("[ingest] Read {} ({} features)", file.display(), read.len());
        features.append(&mut read);
    }

    Ok(features)
}

/// File name for use as a source id.
pub(crate) fn file_label(path: &FsPath) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Source id of feature `index` out of `count` in one file.
pub(crate) fn feature_label(file: &str, index: usize, count: usize) -> String {
    if count > 1 {
        format!("{}:{}", file, index)
    } else {
        file.to_string()
    }
}
