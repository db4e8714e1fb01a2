//! Gateway implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, field, info, instrument, warn, Span};
use uuid::Uuid;

use super::caller::CallerId;
use crate::config::{FleetwatchConfig, GatewayConfig, RetryConfig, ValidationConfig};
use crate::error::GatewayError;
use crate::fanout::{with_backoff, FanoutScheduler, ItemResult, TargetResult};
use crate::ratelimit::{RateLimitDecision, RateLimiter, SweeperHandle};
use crate::remote::{ContainerService, MetricQuery, MetricSource, TimeSeries};
use crate::validate::{
    parse_time_range, validate_identifier, AllowList, MetricKind, ValidationError,
};

/// Raw metrics query as received from the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRequest {
    pub cluster: String,
    pub service: String,
    /// RFC 3339 timestamp
    pub start: String,
    /// RFC 3339 timestamp
    pub end: String,
    /// `cpu` or `memory`
    pub metric: String,
}

/// Result of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

/// Background sweepers started for the gateway's limiters.
pub struct Maintenance {
    sweepers: Vec<SweeperHandle>,
}

impl Maintenance {
    pub async fn shutdown(self) {
        for sweeper in self.sweepers {
            sweeper.shutdown().await;
        }
    }
}

/// Request-governance front door for the dashboard.
pub struct Gateway {
    fleet: Arc<dyn ContainerService>,
    metrics: Arc<dyn MetricSource>,
    scheduler: FanoutScheduler,
    /// Listing, status and redeploy requests
    general_limiter: Arc<RateLimiter>,
    /// Metric queries
    metrics_limiter: Arc<RateLimiter>,
    allow_list: AllowList,
    validation: ValidationConfig,
    settings: GatewayConfig,
    retry: RetryConfig,
    sweep_interval: Duration,
}

impl Gateway {
    /// Create a gateway with limiters built from `config`.
    pub fn new(
        config: &FleetwatchConfig,
        fleet: Arc<dyn ContainerService>,
        metrics: Arc<dyn MetricSource>,
    ) -> Self {
        let general = Arc::new(RateLimiter::new("general", config.limits.general.clone()));
        let metrics_limiter = Arc::new(RateLimiter::new("metrics", config.limits.metrics.clone()));
        Self::with_limiters(config, fleet, metrics, general, metrics_limiter)
    }

    /// Create a gateway around existing limiter instances.
    pub fn with_limiters(
        config: &FleetwatchConfig,
        fleet: Arc<dyn ContainerService>,
        metrics: Arc<dyn MetricSource>,
        general_limiter: Arc<RateLimiter>,
        metrics_limiter: Arc<RateLimiter>,
    ) -> Self {
        info!(
            allowed_targets = config.validation.allowed_targets.len(),
            general_quota = general_limiter.config().max_requests,
            metrics_quota = metrics_limiter.config().max_requests,
            "Gateway initialized"
        );
        Self {
            scheduler: FanoutScheduler::with_config(fleet.clone(), config.fanout.clone()),
            fleet,
            metrics,
            general_limiter,
            metrics_limiter,
            allow_list: AllowList::new(config.validation.allowed_targets.iter().cloned()),
            validation: config.validation.clone(),
            settings: config.gateway.clone(),
            retry: config.fanout.retry.clone(),
            sweep_interval: config.limits.sweep_interval(),
        }
    }

    /// Start the periodic sweep of both limiters.
    pub fn spawn_maintenance(&self) -> Maintenance {
        Maintenance {
            sweepers: vec![
                self.general_limiter.spawn_sweeper(self.sweep_interval),
                self.metrics_limiter.spawn_sweeper(self.sweep_interval),
            ],
        }
    }

    /// Build the caller identifier for a request.
    pub fn caller_id(&self, origin: Option<&str>, user_agent: Option<&str>) -> CallerId {
        CallerId::from_request_parts(origin, user_agent, self.settings.user_agent_max_len)
    }

    pub fn general_limiter(&self) -> &Arc<RateLimiter> {
        &self.general_limiter
    }

    pub fn metrics_limiter(&self) -> &Arc<RateLimiter> {
        &self.metrics_limiter
    }

    /// Count a request against the general quota and report the decision.
    pub fn check_rate_limit(&self, caller: &CallerId) -> RateLimitDecision {
        self.general_limiter.check(caller.as_str())
    }

    fn admit(&self, limiter: &RateLimiter, caller: &CallerId) -> Result<(), GatewayError> {
        let decision = limiter.check(caller.as_str());
        if decision.allowed {
            return Ok(());
        }
        warn!(
            limiter = limiter.name(),
            caller = %caller,
            blocked = decision.is_blocked(),
            "Request rejected by rate limiter"
        );
        Err(GatewayError::RateLimited {
            retry_at: decision.retry_at(),
            blocked: decision.is_blocked(),
        })
    }

    fn check_identifier(&self, text: &str) -> Result<(), ValidationError> {
        validate_identifier(text, self.validation.max_identifier_length)
    }

    fn check_target(&self, target: &str) -> Result<(), ValidationError> {
        self.check_identifier(target)?;
        self.allow_list.require(target)
    }

    async fn within<T, F>(&self, deadline: Duration, operation: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(deadline, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline_secs = deadline.as_secs(), "Request deadline exceeded, cancelling");
                Err(GatewayError::DeadlineExceeded(deadline))
            }
        }
    }

    /// Aggregate service status for each requested cluster.
    pub async fn aggregate_status(
        &self,
        caller: &CallerId,
        targets: &[String],
    ) -> Result<Vec<TargetResult>, GatewayError> {
        self.aggregate_status_within(caller, targets, self.settings.request_timeout())
            .await
    }

    /// Like [`Gateway::aggregate_status`] with an explicit deadline.
    ///
    /// When the deadline passes, every in-flight call is dropped and no
    /// partial result is returned.
    #[instrument(
        skip(self, caller, targets),
        fields(caller = %caller, targets = targets.len(), request_id = field::Empty)
    )]
    pub async fn aggregate_status_within(
        &self,
        caller: &CallerId,
        targets: &[String],
        deadline: Duration,
    ) -> Result<Vec<TargetResult>, GatewayError> {
        Span::current().record("request_id", field::display(Uuid::new_v4()));

        if targets.is_empty() {
            return Err(ValidationError::NothingSelected("cluster").into());
        }
        for target in targets {
            self.check_target(target)?;
        }
        self.admit(&self.general_limiter, caller)?;

        debug!("Starting status aggregation");
        self.within(deadline, async { Ok(self.scheduler.aggregate(targets).await) })
            .await
    }

    /// Force a new deployment of each service in `cluster`.
    #[instrument(
        skip(self, caller, services),
        fields(caller = %caller, services = services.len())
    )]
    pub async fn force_redeploy(
        &self,
        caller: &CallerId,
        cluster: &str,
        services: &[String],
    ) -> Result<Vec<ItemResult>, GatewayError> {
        self.check_target(cluster)?;
        if services.is_empty() {
            return Err(ValidationError::NothingSelected("service").into());
        }
        for service in services {
            self.check_identifier(service)?;
        }
        self.admit(&self.general_limiter, caller)?;

        let results = self
            .within(self.settings.request_timeout(), async {
                Ok(self.scheduler.redeploy(cluster, services).await)
            })
            .await?;

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(succeeded, failed = results.len() - succeeded, "Redeploy request finished");
        Ok(results)
    }

    /// Fetch a CPU or memory time series for one service.
    #[instrument(
        skip(self, caller, request),
        fields(caller = %caller, cluster = %request.cluster, service = %request.service)
    )]
    pub async fn fetch_metrics(
        &self,
        caller: &CallerId,
        request: &MetricsRequest,
    ) -> Result<TimeSeries, GatewayError> {
        self.check_target(&request.cluster)?;
        self.check_identifier(&request.service)?;
        let kind: MetricKind = request.metric.parse()?;
        let range = parse_time_range(&request.start, &request.end, Utc::now())?;
        self.admit(&self.metrics_limiter, caller)?;

        let query = MetricQuery {
            cluster: request.cluster.clone(),
            service: request.service.clone(),
            kind,
            period_secs: range.metric_period_secs(),
            range,
        };
        debug!(
            metric = %kind,
            hours = range.duration_hours(),
            period_secs = query.period_secs,
            "Fetching metric series"
        );

        self.within(self.settings.request_timeout(), async {
            with_backoff(&self.retry, "metric_series", || self.metrics.metric_series(&query))
                .await
                .map_err(GatewayError::from)
        })
        .await
    }

    /// Probe the remote service.
    pub async fn health(&self) -> HealthReport {
        let outcome = tokio::time::timeout(
            self.settings.request_timeout(),
            self.fleet.test_connectivity(),
        )
        .await;
        let (healthy, message) = match outcome {
            Ok(Ok(())) => (true, "Connected to the container service".to_string()),
            Ok(Err(err)) => {
                warn!(error = %err, "Connectivity check failed");
                (false, err.user_message())
            }
            Err(_) => (false, "Connectivity check timed out".to_string()),
        };
        HealthReport {
            healthy,
            message,
            checked_at: Utc::now(),
        }
    }
}
