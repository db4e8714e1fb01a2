//! Retry with exponential backoff for throttled remote calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::remote::RemoteError;

impl RetryConfig {
    /// Delay to wait after the `attempt`-th failed attempt (1-based).
    ///
    /// `base * 2^(attempt - 1)`, capped at `max_delay_ms`, plus uniform jitter
    /// in `[0, jitter_ms]` so concurrent callers do not retry in lockstep.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let backoff = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(backoff.saturating_add(jitter))
    }
}

/// Run `call` until it succeeds, fails with a non-transient error, or
/// `max_attempts` attempts have been made.
///
/// Only throttling errors are retried; anything else is returned at once.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryConfig,
    operation: &str,
    mut call: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Remote call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Throttled by remote service, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(operation, attempts = attempt, error = %err, "Retries exhausted");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn policy() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter_ms: 50,
        }
    }

    /// Fails with `error` for the first `failures` calls.
    async fn flaky(calls: &AtomicU32, failures: u32, error: RemoteError) -> Result<&'static str, RemoteError> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(error)
        } else {
            Ok("done")
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = policy();
        for _ in 0..20 {
            let first = policy.delay_for(1).as_millis();
            assert!((100..=150).contains(&first), "{first}");

            let third = policy.delay_for(3).as_millis();
            assert!((400..=450).contains(&third), "{third}");

            let late = policy.delay_for(30).as_millis();
            assert!((1_000..=1_050).contains(&late), "{late}");
        }
    }

    #[test]
    fn test_no_jitter_is_deterministic() {
        let policy = RetryConfig {
            jitter_ms: 0,
            ..policy()
        };
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    }

    #[test]
    fn test_delay_saturates_near_u64_max() {
        let policy = RetryConfig {
            max_attempts: 4,
            base_delay_ms: u64::MAX,
            max_delay_ms: u64::MAX,
            jitter_ms: u64::MAX,
        };
        assert_eq!(policy.delay_for(3), Duration::from_millis(u64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_throttles_then_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&policy(), "test", || {
            flaky(&calls, 2, RemoteError::Throttled("slow down".into()))
        })
        .await;

        assert_eq!(assert_ok!(result), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_throttling_surfaces_after_ceiling() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&policy(), "test", || {
            flaky(&calls, u32::MAX, RemoteError::Throttled("slow down".into()))
        })
        .await;

        assert!(matches!(assert_err!(result), RemoteError::Throttled(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&policy(), "test", || {
            flaky(&calls, 1, RemoteError::PermissionDenied("no".into()))
        })
        .await;

        assert_eq!(result, Err(RemoteError::PermissionDenied("no".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryConfig {
            jitter_ms: 0,
            ..policy()
        };
        let started = tokio::time::Instant::now();
        let result = with_backoff(&policy, "test", || {
            flaky(&calls, 2, RemoteError::Throttled("slow down".into()))
        })
        .await;

        assert!(result.is_ok());
        // 100ms after the first failure, 200ms after the second.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300), "{waited:?}");
        assert!(waited < Duration::from_millis(310), "{waited:?}");
    }
}
