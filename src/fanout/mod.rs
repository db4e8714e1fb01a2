//! Throttle-aware fan-out of dependent remote calls.
//!
//! A status aggregation for one cluster needs a paginated listing, a batch of
//! describe calls and a task definition lookup per service. This module runs
//! those pipelines for many clusters at once without tripping the remote
//! service's own per-account limits:
//!
//! - targets start staggered by position,
//! - describe batches run sequentially with a pause between them,
//! - enrichment lookups share a process-wide [`EnrichmentGate`],
//! - throttled calls are retried with exponential backoff and jitter.

mod gate;
mod retry;
mod scheduler;
mod task;

pub use gate::{EnrichmentGate, EnrichmentPermit, GateClosed};
pub use retry::with_backoff;
pub use scheduler::FanoutScheduler;
pub use task::{
    FanoutPhase, FanoutTask, ItemResult, ServiceSummary, TargetResult, TargetStatus,
};
