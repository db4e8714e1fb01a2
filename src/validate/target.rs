use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Fixed set of target (cluster) names callers may query.
///
/// Free-text names never reach the remote service, so callers cannot probe
/// for arbitrary resources. An empty list allows nothing.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    targets: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed_target(&self, name: &str) -> bool {
        self.targets.contains(name)
    }

    /// Like [`AllowList::is_allowed_target`], as a `Result`.
    pub fn require(&self, name: &str) -> Result<(), ValidationError> {
        if self.is_allowed_target(name) {
            Ok(())
        } else {
            Err(ValidationError::TargetNotAllowed(name.to_string()))
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Metric series the dashboard can plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
}

impl MetricKind {
    /// Metric name in the `AWS/ECS` namespace.
    pub fn metric_name(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPUUtilization",
            MetricKind::Memory => "MemoryUtilization",
        }
    }
}

impl FromStr for MetricKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" | "cpuutilization" => Ok(MetricKind::Cpu),
            "memory" | "memoryutilization" => Ok(MetricKind::Memory),
            _ => Err(ValidationError::UnknownMetricKind(s.to_string())),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Cpu => write!(f, "cpu"),
            MetricKind::Memory => write!(f, "memory"),
        }
    }
}
