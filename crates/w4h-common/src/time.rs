//! Time handling utilities for forecast timestamps.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Truncate a timestamp to midnight UTC of the same day.
pub fn floor_to_day(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&t.date_naive().and_time(chrono::NaiveTime::MIN))
}

/// Whole-hour offsets of every timestamp from the first one.
///
/// The duration is converted to fractional hours and rounded, never
/// truncated: truncating a value such as 2.9999999 would collapse adjacent
/// offsets onto each other.
pub fn hour_offsets(times: &[DateTime<Utc>]) -> Vec<i64> {
    let Some(&first) = times.first() else {
        return Vec::new();
    };
    times
        .iter()
        .map(|t| {
            let hours = (*t - first).num_milliseconds() as f64 / 3_600_000.0;
            hours.round_ties_even() as i64
        })
        .collect()
}

/// Parse a chart date key (`YYYY-MM-DD`) into midnight UTC.
pub fn parse_date_key(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| TimeParseError::InvalidFormat(s.to_string()))?;
    Ok(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)))
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}
