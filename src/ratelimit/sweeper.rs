//! Background reclamation of expired rate limit entries.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::limiter::RateLimiter;

/// Handle to a running sweeper task.
///
/// The task also stops by itself once the limiter it serves is dropped.
pub struct SweeperHandle {
    limiter: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(limiter = %self.limiter, error = %e, "Sweeper task ended abnormally");
        }
        info!(limiter = %self.limiter, "Sweeper stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl RateLimiter {
    /// Start sweeping this limiter every `interval` on the current runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let (tx, rx) = oneshot::channel();
        let name = self.name().to_string();
        let task = tokio::spawn(run(Arc::downgrade(self), interval, rx));

        info!(limiter = %name, interval_secs = interval.as_secs(), "Sweeper started");
        SweeperHandle {
            limiter: name,
            shutdown: Some(tx),
            task,
        }
    }
}

async fn run(limiter: Weak<RateLimiter>, interval: Duration, mut shutdown: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing has expired yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let Some(limiter) = limiter.upgrade() else {
                    debug!("Rate limiter dropped, sweeper exiting");
                    break;
                };
                limiter.sweep();
            }
        }
    }
}
