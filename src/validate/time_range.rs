use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::ValidationError;

/// Longest range a single metrics query may cover.
pub const MAX_RANGE_DAYS: i64 = 30;
/// How far past "now" a range may end.
pub const MAX_FUTURE_DAYS: i64 = 1;
/// Oldest data the metrics backend retains.
pub const RETENTION_DAYS: i64 = 455;

/// A validated query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }

    /// Datapoint granularity for a metrics query over this range.
    pub fn metric_period_secs(&self) -> u32 {
        let hours = self.duration_hours();
        if hours <= 3.0 {
            60
        } else if hours <= 24.0 {
            300
        } else {
            3600
        }
    }
}

/// Validate a range against the current system time.
pub fn validate_time_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<TimeRange, ValidationError> {
    validate_time_range_at(start, end, Utc::now())
}

/// Validate a range against an explicit reading of "now".
pub fn validate_time_range_at(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<TimeRange, ValidationError> {
    if start >= end {
        return Err(ValidationError::StartNotBeforeEnd);
    }
    if end - start > Duration::days(MAX_RANGE_DAYS) {
        return Err(ValidationError::RangeTooLarge {
            max_days: MAX_RANGE_DAYS,
        });
    }
    if end > now + Duration::days(MAX_FUTURE_DAYS) {
        return Err(ValidationError::EndTooFarInFuture {
            max_days: MAX_FUTURE_DAYS,
        });
    }
    if start < now - Duration::days(RETENTION_DAYS) {
        return Err(ValidationError::StartBeyondRetention {
            max_days: RETENTION_DAYS,
        });
    }
    Ok(TimeRange { start, end })
}

/// Parse two RFC 3339 timestamps and validate the range they span.
pub fn parse_time_range(
    start: &str,
    end: &str,
    now: DateTime<Utc>,
) -> Result<TimeRange, ValidationError> {
    let start = parse_instant(start)?;
    let end = parse_instant(end)?;
    validate_time_range_at(start, end, now)
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ValidationError::InvalidDate)
}
