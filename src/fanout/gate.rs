//! Concurrency gate for remote calls of one kind.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::trace;

/// The gate was closed while a caller was waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("enrichment gate is closed")]
pub struct GateClosed;

/// Bounds in-flight calls across all concurrent requests.
///
/// The scheduler keeps one gate for enrichment lookups and another for
/// redeploy mutations.
///
/// At most `capacity` permits are out at once, and consecutive acquisitions
/// are at least `spacing` apart. Waiters are served in arrival order: both the
/// semaphore and the spacing lock queue fairly.
pub struct EnrichmentGate {
    permits: Semaphore,
    capacity: usize,
    spacing: Duration,
    last_acquired: Mutex<Option<Instant>>,
}

/// Held for the duration of one enrichment call.
pub struct EnrichmentPermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl EnrichmentGate {
    pub fn new(capacity: usize, spacing: Duration) -> Self {
        Self {
            permits: Semaphore::new(capacity),
            capacity,
            spacing,
            last_acquired: Mutex::new(None),
        }
    }

    /// Wait for a free slot, then for the spacing since the previous grant.
    pub async fn acquire(&self) -> Result<EnrichmentPermit<'_>, GateClosed> {
        let permit = self.permits.acquire().await.map_err(|_| GateClosed)?;

        let mut last = self.last_acquired.lock().await;
        if let Some(previous) = *last {
            tokio::time::sleep_until(previous + self.spacing).await;
        }
        *last = Some(Instant::now());
        drop(last);

        trace!(in_flight = self.in_flight(), "Enrichment slot acquired");
        Ok(EnrichmentPermit { _permit: permit })
    }

    /// Reject current and future waiters.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }
}
