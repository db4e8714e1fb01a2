//! Input guards applied before any remote call is made.
//!
//! Everything here is stateless: the same input always yields the same answer.
//! Time-range checks take the current time as an argument for that reason;
//! the convenience wrappers read the system clock.

mod identifier;
mod target;
mod time_range;

pub use identifier::validate_identifier;
pub use target::{AllowList, MetricKind};
pub use time_range::{
    parse_time_range, validate_time_range, validate_time_range_at, TimeRange, MAX_FUTURE_DAYS,
    MAX_RANGE_DAYS, RETENTION_DAYS,
};

use thiserror::Error;

/// Rejected input. Always a client fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Identifier must not be empty")]
    Empty,

    #[error("Identifier exceeds the maximum length of {max} characters")]
    TooLong { max: usize },

    #[error("Identifier contains disallowed characters or patterns")]
    DisallowedPattern,

    #[error("Invalid date format")]
    InvalidDate,

    #[error("Start time must be before end time")]
    StartNotBeforeEnd,

    #[error("Time range cannot exceed {max_days} days")]
    RangeTooLarge { max_days: i64 },

    #[error("End time cannot be more than {max_days} day(s) in the future")]
    EndTooFarInFuture { max_days: i64 },

    #[error("Start time cannot be more than {max_days} days in the past")]
    StartBeyondRetention { max_days: i64 },

    #[error("Target '{0}' is not in the list of allowed targets")]
    TargetNotAllowed(String),

    #[error("Unknown metric kind '{0}', expected one of: cpu, memory")]
    UnknownMetricKind(String),

    #[error("At least one {0} is required")]
    NothingSelected(&'static str),
}
