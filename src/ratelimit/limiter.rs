//! Core rate limiter implementation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, trace, warn};

use super::clock::{Clock, SystemClock};
use super::counter::{RateLimitDecision, TrackedIdentifier};
use crate::config::LimiterConfig;

/// Fixed-window rate limiter with escalating blocks for repeat offenders.
///
/// Each identifier lives in its own map slot. A check runs its whole
/// read-modify-write while holding that slot, so concurrent requests from one
/// identifier are serialized.
pub struct RateLimiter {
    /// Name used in logs ("general", "metrics", ...)
    name: String,
    config: LimiterConfig,
    identifiers: DashMap<String, TrackedIdentifier>,
    clock: Arc<dyn Clock>,
}

/// Point-in-time counts for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct LimiterStats {
    pub tracked: usize,
    pub blocked: usize,
}

impl RateLimiter {
    /// Create a new rate limiter reading the system clock.
    pub fn new(name: impl Into<String>, config: LimiterConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a new rate limiter with a custom time source.
    pub fn with_clock(name: impl Into<String>, config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            identifiers: DashMap::new(),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Decide whether a request from `identifier` may proceed.
    ///
    /// The request is counted against the quota whether or not it is allowed.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = self.clock.now();

        trace!(limiter = %self.name, identifier, "Checking rate limit");

        match self.identifiers.entry(identifier.to_owned()) {
            Entry::Vacant(slot) => {
                let tracked = TrackedIdentifier::fresh(now, self.config.window());
                let reset_at = tracked.entry.window_reset_at;
                slot.insert(tracked);
                debug!(limiter = %self.name, identifier, "Tracking new identifier");
                RateLimitDecision::allowed(reset_at)
            }
            Entry::Occupied(mut slot) => self.evaluate(identifier, slot.get_mut(), now),
        }
    }

    fn evaluate(
        &self,
        identifier: &str,
        tracked: &mut TrackedIdentifier,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        if let Some(until) = tracked.entry.blocked_until {
            if now < until {
                trace!(limiter = %self.name, identifier, blocked_until = %until, "Identifier is blocked");
                return RateLimitDecision::blocked(until);
            }
            info!(limiter = %self.name, identifier, "Block expired, resetting identifier");
            *tracked = TrackedIdentifier::fresh(now, self.config.window());
            return RateLimitDecision::allowed(tracked.entry.window_reset_at);
        }

        if tracked.entry.window_expired(now) {
            tracked.entry = super::counter::RateLimitEntry::fresh(now, self.config.window());
            return RateLimitDecision::allowed(tracked.entry.window_reset_at);
        }

        tracked.entry.count = tracked.entry.count.saturating_add(1);
        let reset_at = tracked.entry.window_reset_at;

        if tracked.entry.count <= self.config.max_requests {
            return RateLimitDecision::allowed(reset_at);
        }

        // Only the request that first crosses the quota counts as a violation.
        if tracked.entry.count > self.config.max_requests.saturating_add(1) {
            return RateLimitDecision::over_quota(reset_at);
        }

        tracked.violations += 1;
        if tracked.violations >= self.config.max_violations {
            let until = now
                .checked_add_signed(self.config.block_duration())
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            tracked.entry.blocked_until = Some(until);
            tracked.violations = 0;
            warn!(
                limiter = %self.name,
                identifier,
                blocked_until = %until,
                "Identifier blocked after repeated violations"
            );
            return RateLimitDecision::blocked(until);
        }

        debug!(
            limiter = %self.name,
            identifier,
            violations = tracked.violations,
            max_violations = self.config.max_violations,
            "Rate limit exceeded"
        );
        RateLimitDecision::over_quota(reset_at)
    }

    /// Clear all state for an identifier.
    ///
    /// Administrative override, also used to lift a block by hand.
    pub fn reset(&self, identifier: &str) {
        if self.identifiers.remove(identifier).is_some() {
            info!(limiter = %self.name, identifier, "Rate limit state reset");
        }
    }

    /// Remove entries whose window and block have both run out.
    ///
    /// Candidates are collected first with a read-only scan, which holds one
    /// shard's read lock at a time; a `check` hashing to that shard waits for
    /// the scan of that shard only. Each candidate is then removed under its
    /// shard's write lock after re-checking, so a request that arrived in
    /// between keeps its entry. Returns the number of removed identifiers.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();

        let candidates: Vec<String> = self
            .identifiers
            .iter()
            .filter(|slot| slot.value().entry.is_reclaimable(now))
            .map(|slot| slot.key().clone())
            .collect();

        let removed = candidates
            .iter()
            .filter(|key| {
                self.identifiers
                    .remove_if(key.as_str(), |_, tracked| tracked.entry.is_reclaimable(now))
                    .is_some()
            })
            .count();

        debug!(
            limiter = %self.name,
            removed,
            remaining = self.identifiers.len(),
            "Swept expired rate limit entries"
        );
        removed
    }

    /// Get the number of tracked identifiers.
    pub fn tracked_count(&self) -> usize {
        self.identifiers.len()
    }

    pub fn stats(&self) -> LimiterStats {
        let now = self.clock.now();
        let blocked = self
            .identifiers
            .iter()
            .filter(|slot| slot.value().entry.block_active(now))
            .count();
        LimiterStats {
            tracked: self.identifiers.len(),
            blocked,
        }
    }

    #[cfg(test)]
    fn violations(&self, identifier: &str) -> Option<u32> {
        self.identifiers.get(identifier).map(|t| t.violations)
    }
}
