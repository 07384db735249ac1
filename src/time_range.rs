//! Hour-aligned query windows
//!
//! A `TimeRange` is built once per query from optional start/end hour labels
//! and expands into the ordered list of hour buckets the fan-out executor
//! scans. Every stored key starts with one of these labels.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::error::{Result, StatsError};

/// chrono format of an hour bucket label, e.g. `2006-01-02T15`
pub const HOUR_FORMAT: &str = "%Y-%m-%dT%H";

/// Window used when no start hour is supplied (7 days)
pub const DEFAULT_LOOKBACK_HOURS: i64 = 168;

/// Longest accepted default window (100 years)
pub const MAX_LOOKBACK_HOURS: i64 = 36_525 * 24;

const HOUR_LABEL_LEN: usize = "2006-01-02T15".len();

/// Inclusive, hour-truncated window with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Parse start/end hour labels; empty text falls back to the defaults
    /// (start = now - 7 days, end = now)
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::parse_at(start, end, Utc::now(), DEFAULT_LOOKBACK_HOURS)
    }

    /// Same as [`TimeRange::parse`] with an explicit clock and lookback
    pub fn parse_at(
        start: &str,
        end: &str,
        now: DateTime<Utc>,
        lookback_hours: i64,
    ) -> Result<Self> {
        let start = if start.is_empty() {
            Duration::try_hours(lookback_hours)
                .and_then(|lookback| now.checked_sub_signed(lookback))
                .ok_or_else(|| StatsError::InvalidTimestamp {
                    field: "start",
                    value: format!("{lookback_hours} hours before now"),
                })?
        } else {
            parse_hour("start", start)?
        };
        let end = if end.is_empty() {
            now
        } else {
            parse_hour("end", end)?
        };
        Self::new(start, end)
    }

    /// Build from instants, truncating both to the hour
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let start = truncate_to_hour(start);
        let end = truncate_to_hour(end);
        if end < start {
            return Err(StatsError::RangeInverted {
                start: hour_label(start),
                end: hour_label(end),
            });
        }
        Ok(TimeRange { start, end })
    }

    /// Canonical label of the first bucket
    pub fn start_hour(&self) -> String {
        hour_label(self.start)
    }

    /// Canonical label of the last bucket
    pub fn end_hour(&self) -> String {
        hour_label(self.end)
    }

    /// Number of buckets in the window (always >= 1)
    pub fn hours(&self) -> usize {
        ((self.end - self.start).num_hours() + 1) as usize
    }

    /// Every bucket label from start to end inclusive, ascending
    pub fn by_hour(&self) -> Vec<String> {
        let mut result = Vec::with_capacity(self.hours());
        let mut it = self.start;
        while it <= self.end {
            result.push(hour_label(it));
            it += Duration::hours(1);
        }
        result
    }
}

/// Format an instant as its hour bucket label
pub fn hour_label(t: DateTime<Utc>) -> String {
    t.format(HOUR_FORMAT).to_string()
}

/// Convert a chat event timestamp (`"<epoch seconds>.<micros>"`) to its UTC
/// hour bucket label
pub fn hour_from_chat_timestamp(text: &str) -> Result<String> {
    let invalid = || StatsError::InvalidTimestamp {
        field: "timestamp",
        value: text.to_string(),
    };

    let seconds: f64 = text.trim().parse().map_err(|_| invalid())?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid());
    }
    let instant = Utc
        .timestamp_opt(seconds.floor() as i64, 0)
        .single()
        .ok_or_else(invalid)?;
    Ok(hour_label(instant))
}

fn parse_hour(field: &'static str, text: &str) -> Result<DateTime<Utc>> {
    let invalid = || StatsError::InvalidTimestamp {
        field,
        value: text.to_string(),
    };

    if text.len() != HOUR_LABEL_LEN {
        return Err(invalid());
    }
    // chrono needs a minute component to build a NaiveDateTime
    let naive = NaiveDateTime::parse_from_str(&format!("{text}:00"), "%Y-%m-%dT%H:%M")
        .map_err(|_| invalid())?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn truncate_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .and_hms_opt(t.hour(), 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(text: &str) -> DateTime<Utc> {
        parse_hour("test", text).unwrap()
    }

    #[test]
    fn test_by_hour_inclusive() {
        let range = TimeRange::parse("2006-01-02T15", "2006-01-02T20").unwrap();
        assert_eq!(
            range.by_hour(),
            vec![
                "2006-01-02T15",
                "2006-01-02T16",
                "2006-01-02T17",
                "2006-01-02T18",
                "2006-01-02T19",
                "2006-01-02T20",
            ]
        );
        assert_eq!(range.hours(), 6);
    }

    #[test]
    fn test_single_hour() {
        let range = TimeRange::parse("2006-01-02T15", "2006-01-02T15").unwrap();
        assert_eq!(range.by_hour(), vec!["2006-01-02T15"]);
    }

    #[test]
    fn test_crosses_day_boundary() {
        let range = TimeRange::parse("2006-01-02T22", "2006-01-03T01").unwrap();
        assert_eq!(
            range.by_hour(),
            vec![
                "2006-01-02T22",
                "2006-01-02T23",
                "2006-01-03T00",
                "2006-01-03T01"
            ]
        );
    }

    #[test]
    fn test_inverted_range() {
        let err = TimeRange::parse("2006-01-02T20", "2006-01-02T15").unwrap_err();
        assert_eq!(
            err,
            StatsError::RangeInverted {
                start: "2006-01-02T20".into(),
                end: "2006-01-02T15".into(),
            }
        );
    }

    #[test]
    fn test_invalid_format() {
        for bad in ["2006-01-02", "2006-01-02T15:04", "yesterday", "2006-13-02T15"] {
            let err = TimeRange::parse(bad, "").unwrap_err();
            assert!(
                matches!(err, StatsError::InvalidTimestamp { field: "start", .. }),
                "{bad} should be rejected, got {err:?}"
            );
        }
        let err = TimeRange::parse("", "nope").unwrap_err();
        assert!(matches!(err, StatsError::InvalidTimestamp { field: "end", .. }));
    }

    #[test]
    fn test_defaults() {
        let now = Utc.with_ymd_and_hms(2018, 5, 10, 12, 34, 56).unwrap();
        let range = TimeRange::parse_at("", "", now, DEFAULT_LOOKBACK_HOURS).unwrap();
        assert_eq!(range.start_hour(), "2018-05-03T12");
        assert_eq!(range.end_hour(), "2018-05-10T12");
        assert_eq!(range.hours(), 169);
    }

    #[test]
    fn test_lookback_beyond_calendar_rejected() {
        let now = at("2018-05-10T12");
        let err = TimeRange::parse_at("", "", now, 10_000_000_000).unwrap_err();
        assert!(matches!(err, StatsError::InvalidTimestamp { field: "start", .. }));

        let err = TimeRange::parse_at("", "", now, i64::MAX).unwrap_err();
        assert!(matches!(err, StatsError::InvalidTimestamp { field: "start", .. }));
    }

    #[test]
    fn test_start_in_future_of_default_end() {
        let now = at("2018-05-10T12");
        let err = TimeRange::parse_at("2018-05-11T00", "", now, 168).unwrap_err();
        assert!(matches!(err, StatsError::RangeInverted { .. }));
    }

    #[test]
    fn test_new_truncates() {
        let start = Utc.with_ymd_and_hms(2018, 5, 10, 12, 59, 59).unwrap();
        let end = Utc.with_ymd_and_hms(2018, 5, 10, 13, 0, 1).unwrap();
        let range = TimeRange::new(start, end).unwrap();
        assert_eq!(range.by_hour(), vec!["2018-05-10T12", "2018-05-10T13"]);
    }

    #[test]
    fn test_chat_timestamp() {
        // 2018-03-15 10:44:09 UTC
        assert_eq!(
            hour_from_chat_timestamp("1521110649.000156").unwrap(),
            "2018-03-15T10"
        );
        assert_eq!(hour_from_chat_timestamp("0").unwrap(), "1970-01-01T00");
        assert!(hour_from_chat_timestamp("").is_err());
        assert!(hour_from_chat_timestamp("abc.def").is_err());
        assert!(hour_from_chat_timestamp("-5").is_err());
    }
}
