use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validate::{MetricKind, TimeRange};

/// One page of a service listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePage {
    pub service_arns: Vec<String>,
    /// Continuation token; `None` on the last page
    pub next_token: Option<String>,
}

/// Described state of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub arn: String,
    pub name: String,
    pub status: String,
    pub desired_count: u32,
    pub running_count: u32,
    pub pending_count: u32,
    /// Task definition reference, when the service has one
    pub task_definition: Option<String>,
}

/// Task definition details used to enrich a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub arn: String,
    pub family: String,
    pub revision: u32,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// A metrics query built from validated input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricQuery {
    pub cluster: String,
    pub service: String,
    pub kind: MetricKind,
    pub range: TimeRange,
    pub period_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub label: String,
    pub points: Vec<DataPoint>,
}
