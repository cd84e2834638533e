//! Instants, intervals, durations and timezone handling.
//!
//! All instants are `DateTime<Utc>`; a timezone is only ever attached for
//! local-time interpretation (day keys, rendering). Durations are `f64`
//! seconds. Leap seconds are ignored and DST rules come from the `chrono-tz`
//! database.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TourError};

/// Accepted layouts for timestamps without an offset.
const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y:%m:%d %H:%M:%S",
];

/// An absolute instant together with the zone it should be read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedInstant {
    pub instant: DateTime<Utc>,
    pub timezone: Tz,
}

impl LocalizedInstant {
    pub fn new(instant: DateTime<Utc>, timezone: Tz) -> Self {
        Self { instant, timezone }
    }

    /// The same instant on the local wall clock.
    pub fn local(&self) -> DateTime<Tz> {
        self.instant.with_timezone(&self.timezone)
    }

    /// Local calendar date as `YYYY-MM-DD`.
    pub fn local_date(&self) -> String {
        partition_date(self.instant, self.timezone)
    }
}

/// Half-open containment: `start <= instant < end`.
#[inline]
pub fn interval_contains(start: DateTime<Utc>, end: DateTime<Utc>, instant: DateTime<Utc>) -> bool {
    start <= instant && instant < end
}

/// Seconds from `start` to `instant`. Negative when `instant` precedes `start`.
#[inline]
pub fn elapsed_seconds(start: DateTime<Utc>, instant: DateTime<Utc>) -> f64 {
    delta_seconds(instant - start)
}

/// Seconds from `start` to `end`.
#[inline]
pub fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    delta_seconds(end - start)
}

/// Elapsed seconds of every timestamp relative to the first one.
pub fn elapsed_series(timestamps: &[DateTime<Utc>]) -> Vec<f64> {
    match timestamps.first() {
        Some(&start) => timestamps
            .iter()
            .map(|&t| elapsed_seconds(start, t))
            .collect(),
        None => Vec::new(),
    }
}

/// Convert fractional seconds to a chrono duration (nanosecond precision).
pub fn seconds_to_duration(seconds: f64) -> Duration {
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9).round();
    Duration::seconds(whole as i64) + Duration::nanoseconds(nanos as i64)
}

fn delta_seconds(delta: Duration) -> f64 {
    // subsec_nanos carries the sign of the whole delta
    delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) / 1e9
}

/// Parse an IANA timezone name such as `America/Mexico_City`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>().map_err(|_| TourError::UnknownTimezone {
        name: name.to_string(),
    })
}

/// Parse a timestamp into an absolute instant.
///
/// RFC 3339 text keeps its own offset. Text without an offset is read as a
/// wall-clock time in `timezone`.
pub fn parse_instant(text: &str, timezone: Tz) -> Result<DateTime<Utc>> {
    let trimmed = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return local_from_naive(naive, timezone);
        }
    }

    Err(TourError::InvalidTimestamp {
        value: text.to_string(),
        message: "expected RFC 3339 or YYYY-MM-DDTHH:MM:SS".to_string(),
    })
}

/// Interpret a wall-clock time in `timezone` as an absolute instant.
///
/// Ambiguous times (clocks falling back) resolve to the earlier instant.
/// Times skipped by a DST jump fail with [`TourError::NonexistentLocalTime`].
pub fn local_from_naive(naive: NaiveDateTime, timezone: Tz) -> Result<DateTime<Utc>> {
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => {
            log::debug!(
                "[temporal] {} is ambiguous in {}, using the earlier instant",
                naive,
                timezone
            );
            Ok(earliest.with_timezone(&Utc))
        }
        LocalResult::None => Err(TourError::NonexistentLocalTime {
            local: naive.to_string(),
            timezone: timezone.name().to_string(),
        }),
    }
}

/// Reinterpret camera "epoch seconds" that were counted on the local wall
/// clock rather than in UTC.
///
/// Many cameras store capture time without a zone, so the number only means
/// something once the zone the clock was set to is known. This assumes the
/// device clock was set to local time in `timezone` at capture; it is a
/// heuristic, not a guaranteed-correct conversion.
pub fn local_epoch_to_instant(local_epoch_seconds: i64, timezone: Tz) -> Result<DateTime<Utc>> {
    let naive = DateTime::from_timestamp(local_epoch_seconds, 0)
        .ok_or_else(|| TourError::InvalidTimestamp {
            value: local_epoch_seconds.to_string(),
            message: "epoch seconds out of range".to_string(),
        })?
        .naive_utc();
    local_from_naive(naive, timezone)
}

/// Calendar date of `instant` in `timezone`, as `YYYY-MM-DD`.
pub fn partition_date(instant: DateTime<Utc>, timezone: Tz) -> String {
    instant
        .with_timezone(&timezone)
        .format("%Y-%m-%d")
        .to_string()
}

/// RFC 3339 UTC text of a session start.
///
/// Keeps every fractional digit the instant has, so distinct instants never
/// share a key. Text order is not time order once fractions differ in length.
pub fn session_stamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// RFC 3339 UTC text for diagnostics and documents.
pub fn iso8601(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_interval_is_half_open() {
        let start = utc("2022-05-01T08:00:00Z");
        let end = utc("2022-05-01T09:00:00Z");
        assert!(interval_contains(start, end, start));
        assert!(interval_contains(start, end, utc("2022-05-01T08:59:59Z")));
        assert!(!interval_contains(start, end, end));
    }

    #[test]
    fn test_elapsed_can_be_negative() {
        let start = utc("2022-05-01T08:00:00Z");
        assert_eq!(elapsed_seconds(start, utc("2022-05-01T07:59:30Z")), -30.0);
    }

    #[test]
    fn test_fractional_elapsed() {
        let start = utc("2022-05-01T08:00:00Z");
        let later = utc("2022-05-01T08:00:01.250Z");
        assert!((elapsed_seconds(start, later) - 1.25).abs() < 1e-9);
        assert!((elapsed_seconds(later, start) + 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_seconds_to_duration_roundtrip_value() {
        let d = seconds_to_duration(90.5);
        assert_eq!(d.num_milliseconds(), 90_500);
    }

    #[test]
    fn test_partition_date_uses_timezone() {
        // 03:00 UTC is still the previous evening in Mexico City
        let instant = utc("2022-05-02T03:00:00Z");
        assert_eq!(partition_date(instant, Tz::UTC), "2022-05-02");
        assert_eq!(
            partition_date(instant, chrono_tz::America::Mexico_City),
            "2022-05-01"
        );
    }

    #[test]
    fn test_session_stamp_precision() {
        assert_eq!(session_stamp(utc("2022-05-01T08:00:00Z")), "2022-05-01T08:00:00Z");
        assert_eq!(
            session_stamp(utc("2022-05-01T08:00:00.0004Z")),
            "2022-05-01T08:00:00.000400Z"
        );
    }

    #[test]
    fn test_nonexistent_local_time() {
        // Clocks in Stockholm jumped from 02:00 to 03:00 on 2022-03-27
        let naive = NaiveDateTime::parse_from_str("2022-03-27T02:30:00", "%Y-%m-%dT%H:%M:%S")
            .unwrap();
        assert!(matches!(
            local_from_naive(naive, chrono_tz::Europe::Stockholm),
            Err(TourError::NonexistentLocalTime { .. })
        ));
    }
}
