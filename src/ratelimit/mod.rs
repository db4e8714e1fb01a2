//! Rate limiting logic and state management.

mod clock;
mod counter;
mod limiter;
mod sweeper;

pub use clock::{Clock, SystemClock};
pub use counter::{RateLimitDecision, RateLimitEntry};
pub use limiter::{LimiterStats, RateLimiter};
pub use sweeper::SweeperHandle;

#[cfg(test)]
pub(crate) use clock::ManualClock;
