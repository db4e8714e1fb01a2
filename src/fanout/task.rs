//! Per-target work descriptions and their results.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::remote::{RemoteError, ServiceDescription, TaskDefinition};

/// Phases of a target pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutPhase {
    /// Paginated listing of service identifiers
    List,
    /// Batched describe calls
    Describe,
    /// Per-service task definition lookups
    Enrich,
}

impl FanoutPhase {
    pub const ALL: [FanoutPhase; 3] = [FanoutPhase::List, FanoutPhase::Describe, FanoutPhase::Enrich];
}

impl fmt::Display for FanoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanoutPhase::List => write!(f, "listing services"),
            FanoutPhase::Describe => write!(f, "describing services"),
            FanoutPhase::Enrich => write!(f, "looking up task definitions"),
        }
    }
}

/// One top-level aggregation target and how to run it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutTask {
    /// Position in the caller's request
    pub position: usize,
    pub target: String,
    /// Delay before the first remote call
    pub start_delay: Duration,
    pub phases: Vec<FanoutPhase>,
}

impl FanoutTask {
    /// Plan one task per target, staggering starts by `stagger` per position.
    pub fn plan(targets: &[String], stagger: Duration, enrich: bool) -> Vec<FanoutTask> {
        let phases: Vec<FanoutPhase> = FanoutPhase::ALL
            .into_iter()
            .filter(|phase| enrich || *phase != FanoutPhase::Enrich)
            .collect();

        targets
            .iter()
            .enumerate()
            .map(|(position, target)| FanoutTask {
                position,
                target: target.clone(),
                start_delay: stagger.saturating_mul(position as u32),
                phases: phases.clone(),
            })
            .collect()
    }

    pub fn includes(&self, phase: FanoutPhase) -> bool {
        self.phases.contains(&phase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Ok,
    Error,
}

/// A described service, with its task definition when enrichment ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSummary {
    pub arn: String,
    pub name: String,
    pub status: String,
    pub desired_count: u32,
    pub running_count: u32,
    pub pending_count: u32,
    pub task_definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<TaskDefinition>,
    /// Why the definition lookup failed, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_error: Option<String>,
}

impl From<ServiceDescription> for ServiceSummary {
    fn from(service: ServiceDescription) -> Self {
        Self {
            arn: service.arn,
            name: service.name,
            status: service.status,
            desired_count: service.desired_count,
            running_count: service.running_count,
            pending_count: service.pending_count,
            task_definition: service.task_definition,
            definition: None,
            enrichment_error: None,
        }
    }
}

/// Aggregated status of one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetResult {
    pub target: String,
    pub status: TargetStatus,
    pub services: Vec<ServiceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TargetResult {
    pub fn ok(target: String, services: Vec<ServiceSummary>) -> Self {
        Self {
            target,
            status: TargetStatus::Ok,
            services,
            message: None,
        }
    }

    pub fn failed(target: String, phase: FanoutPhase, error: &RemoteError) -> Self {
        Self {
            target,
            status: TargetStatus::Error,
            services: Vec::new(),
            message: Some(format!("Failed while {}: {}", phase, error.user_message())),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TargetStatus::Ok
    }
}

/// Outcome of a per-item mutation such as a redeploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub item: String,
    pub success: bool,
    pub message: String,
}
