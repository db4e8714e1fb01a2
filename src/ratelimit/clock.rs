//! Wall-clock source for rate limiting decisions.

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Decisions are made by comparing this reading against stored timestamps,
/// so tests can drive windows and blocks without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation using `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: parking_lot::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: parking_lot::Mutex::new(start),
        }
    }

    pub(crate) fn advance_ms(&self, ms: i64) {
        let mut now = self.now.lock();
        *now += chrono::Duration::milliseconds(ms);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
