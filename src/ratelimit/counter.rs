//! Per-identifier rate limit state.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Request tally for one identifier.
///
/// A request arriving exactly at `window_reset_at` belongs to the next window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests seen in the current window
    pub count: u32,
    /// When the current window ends
    pub window_reset_at: DateTime<Utc>,
    /// Set while the identifier is serving a block
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitEntry {
    /// Open a new window holding a single request.
    pub fn fresh(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 1,
            window_reset_at: now
                .checked_add_signed(window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            blocked_until: None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_until.is_some()
    }

    pub fn window_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_reset_at
    }

    /// Whether a block is set and still running at `now`.
    pub fn block_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self.blocked_until, Some(until) if now < until)
    }

    /// Whether the entry carries no information a future check would use.
    pub fn is_reclaimable(&self, now: DateTime<Utc>) -> bool {
        self.window_expired(now) && !self.block_active(now)
    }
}

/// Entry plus its violation count, kept in one map slot so both change together.
#[derive(Debug, Clone)]
pub(crate) struct TrackedIdentifier {
    pub(crate) entry: RateLimitEntry,
    pub(crate) violations: u32,
}

impl TrackedIdentifier {
    pub(crate) fn fresh(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            entry: RateLimitEntry::fresh(now, window),
            violations: 0,
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitDecision {
    pub(crate) fn allowed(reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            reset_at: Some(reset_at),
            blocked_until: None,
        }
    }

    pub(crate) fn over_quota(reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            reset_at: Some(reset_at),
            blocked_until: None,
        }
    }

    pub(crate) fn blocked(until: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            reset_at: None,
            blocked_until: Some(until),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_until.is_some()
    }

    /// Earliest time a rejected caller may succeed again.
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        self.blocked_until.or(self.reset_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_entry() {
        let now = Utc::now();
        let entry = RateLimitEntry::fresh(now, Duration::seconds(60));

        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_reset_at, now + Duration::seconds(60));
        assert!(!entry.is_blocked());
    }

    #[test]
    fn test_window_boundary_starts_new_window() {
        let now = Utc::now();
        let entry = RateLimitEntry::fresh(now, Duration::seconds(60));

        assert!(!entry.window_expired(now + Duration::milliseconds(59_999)));
        assert!(entry.window_expired(now + Duration::seconds(60)));
    }

    #[test]
    fn test_reclaimable_waits_for_block() {
        let now = Utc::now();
        let mut entry = RateLimitEntry::fresh(now, Duration::seconds(60));
        entry.blocked_until = Some(now + Duration::minutes(15));

        let later = now + Duration::minutes(5);
        assert!(entry.window_expired(later));
        assert!(!entry.is_reclaimable(later));
        assert!(entry.is_reclaimable(now + Duration::minutes(15)));
    }

    #[test]
    fn test_decision_retry_at_prefers_block() {
        let now = Utc::now();
        assert_eq!(RateLimitDecision::over_quota(now).retry_at(), Some(now));

        let until = now + Duration::minutes(15);
        let decision = RateLimitDecision::blocked(until);
        assert!(decision.is_blocked());
        assert_eq!(decision.retry_at(), Some(until));
    }
}
