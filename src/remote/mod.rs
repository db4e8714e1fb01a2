//! Narrow interface to the managed container and metrics APIs.
//!
//! The cloud SDK client lives outside this crate; it is consumed through the
//! traits below so the governance layer can be driven by any implementation.

mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use types::{
    DataPoint, MetricQuery, ServiceDescription, ServicePage, TaskDefinition, TimeSeries,
};

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The service is throttling this account; worth retrying later
    #[error("Request throttled by remote service: {0}")]
    Throttled(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Remote service error: {0}")]
    Unknown(String),
}

impl RemoteError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Throttled(_))
    }

    /// Message suitable for showing to a dashboard user.
    pub fn user_message(&self) -> String {
        match self {
            RemoteError::Throttled(_) => {
                "The cloud provider is throttling requests. Please try again in a moment".to_string()
            }
            RemoteError::NotFound(what) => format!("Resource not found: {}", what),
            RemoteError::PermissionDenied(_) => {
                "Access denied. Check the permissions granted to the dashboard credentials"
                    .to_string()
            }
            RemoteError::Unknown(detail) => format!("Unexpected error from the cloud provider: {}", detail),
        }
    }
}

/// The container orchestration API.
#[async_trait]
pub trait ContainerService: Send + Sync {
    /// One page of service identifiers in `cluster`.
    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<ServicePage, RemoteError>;

    /// Describe up to the per-call maximum of services by identifier.
    async fn describe_services(
        &self,
        cluster: &str,
        service_arns: &[String],
    ) -> Result<Vec<ServiceDescription>, RemoteError>;

    async fn describe_task_definition(
        &self,
        task_definition: &str,
    ) -> Result<TaskDefinition, RemoteError>;

    /// Start a new deployment of `service` with its current definition.
    async fn force_redeploy(&self, cluster: &str, service: &str) -> Result<(), RemoteError>;

    /// Cheap authenticated call used by health checks.
    async fn test_connectivity(&self) -> Result<(), RemoteError>;
}

/// The metrics API.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn metric_series(&self, query: &MetricQuery) -> Result<TimeSeries, RemoteError>;
}
