//! GPX track logs.
//!
//! Each `<trk>` becomes one track feature: a single `<trkseg>` maps to a line,
//! several to a multi-line. Track points without a `<time>` cannot be placed
//! on the timeline and are skipped.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path as FsPath, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use gpx::{Gpx, Waypoint};
use log::debug;
use time::OffsetDateTime;

use super::{feature_label, file_label, TrackSource};
use crate::error::{Result, TourError};
use crate::{Coordinate, Properties, TrackFeature, TrackGeometry, TrackLine};

/// A GPX file on disk.
#[derive(Debug, Clone)]
pub struct GpxTrackFile {
    pub path: PathBuf,
    pub timezone: Option<Tz>,
}

impl GpxTrackFile {
    pub fn new(path: &FsPath, timezone: Option<Tz>) -> Self {
        Self {
            path: path.to_path_buf(),
            timezone,
        }
    }

    /// Parse track features from any GPX reader.
    pub fn parse_reader<R: Read>(source_id: &str, reader: R, timezone: Option<Tz>) -> Result<Vec<TrackFeature>> {
        let gpx: Gpx = gpx::read(reader)?;
        let count = gpx.tracks.len();
        let mut features = Vec::with_capacity(count);

        for (i, track) in gpx.tracks.iter().enumerate() {
            let id = feature_label(source_id, i, count);
            let mut lines = Vec::with_capacity(track.segments.len());

            for segment in &track.segments {
                let mut coordinates = Vec::with_capacity(segment.points.len());
                let mut timestamps = Vec::with_capacity(segment.points.len());
                let mut untimed = 0usize;

                for point in &segment.points {
                    match point_instant(&id, point)? {
                        Some(t) => {
                            coordinates.push(point_coordinate(point));
                            timestamps.push(t);
                        }
                        None => untimed += 1,
                    }
                }
                if untimed > 0 {
                    debug!("[ingest] {}: skipped {} points without time", id, untimed);
                }
                lines.push(TrackLine::new(coordinates, timestamps));
            }

            let geometry = if lines.len() == 1 {
                TrackGeometry::LineString(lines.remove(0))
            } else {
                TrackGeometry::MultiLineString(lines)
            };

            features.push(TrackFeature {
                source_id: id,
                name: track.name.clone(),
                timezone,
                geometry,
                properties: Properties::new(),
            });
        }

        Ok(features)
    }
}

impl TrackSource for GpxTrackFile {
    fn read_tracks(&self) -> Result<Vec<TrackFeature>> {
        if !self.path.exists() {
            return Err(TourError::MissingInputFile {
                path: self.path.clone(),
            });
        }
        let reader = BufReader::new(File::open(&self.path)?);
        Self::parse_reader(&file_label(&self.path), reader, self.timezone)
    }
}

fn point_coordinate(point: &Waypoint) -> Coordinate {
    let p = point.point();
    let coordinate = Coordinate::new(p.y(), p.x());
    match point.elevation {
        Some(ele) => coordinate.with_elevation(ele),
        None => coordinate,
    }
}

fn point_instant(source_id: &str, point: &Waypoint) -> Result<Option<DateTime<Utc>>> {
    let Some(time) = point.time.clone() else {
        return Ok(None);
    };
    let odt = OffsetDateTime::from(time);
    DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
        .map(Some)
        .ok_or_else(|| TourError::Ingest {
            source_id: source_id.to_string(),
            message: format!("track point time {} out of range", odt),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SEGMENTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Morning</name>
    <trkseg>
      <trkpt lat="19.40" lon="-99.10"><ele>2240</ele><time>2022-05-01T08:00:00Z</time></trkpt>
      <trkpt lat="19.41" lon="-99.10"><time>2022-05-01T08:05:00Z</time></trkpt>
      <trkpt lat="19.42" lon="-99.10"></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="19.50" lon="-99.10"><time>2022-05-01T09:00:00Z</time></trkpt>
      <trkpt lat="19.51" lon="-99.10"><time>2022-05-01T09:05:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_segments_become_multiline() {
        let features = GpxTrackFile::parse_reader("morning.gpx", TWO_SEGMENTS.as_bytes(), None).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].name.as_deref(), Some("Morning"));

        let TrackGeometry::MultiLineString(lines) = &features[0].geometry else {
            panic!("expected multi-line geometry");
        };
        assert_eq!(lines.len(), 2);
        // Untimed third point is skipped
        assert_eq!(lines[0].coordinates.len(), 2);
        assert_eq!(lines[0].timestamps.len(), 2);
        assert_eq!(lines[0].coordinates[0].elevation, Some(2240.0));
        assert!((lines[0].coordinates[0].longitude + 99.10).abs() < 1e-9);
    }
}
