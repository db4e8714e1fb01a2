//! Bounded, retrying fan-out over the remote container service.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use super::gate::EnrichmentGate;
use super::retry::with_backoff;
use super::task::{FanoutPhase, FanoutTask, ItemResult, ServiceSummary, TargetResult};
use crate::config::FanoutConfig;
use crate::remote::{ContainerService, RemoteError, ServiceDescription};

/// Runs aggregation pipelines against the remote service.
///
/// Per target: list, then describe in batches, then enrich through the shared
/// gate. A failing target never affects its siblings.
pub struct FanoutScheduler {
    service: Arc<dyn ContainerService>,
    gate: Arc<EnrichmentGate>,
    redeploy_gate: EnrichmentGate,
    config: FanoutConfig,
}

impl FanoutScheduler {
    pub fn new(service: Arc<dyn ContainerService>, gate: Arc<EnrichmentGate>, config: FanoutConfig) -> Self {
        let redeploy_gate =
            EnrichmentGate::new(config.max_concurrent_redeploys, config.redeploy_spacing());
        Self {
            service,
            gate,
            redeploy_gate,
            config,
        }
    }

    /// Build a scheduler with its own gate sized from `config`.
    pub fn with_config(service: Arc<dyn ContainerService>, config: FanoutConfig) -> Self {
        let gate = Arc::new(EnrichmentGate::new(
            config.max_concurrent_enrichments,
            config.min_enrichment_spacing(),
        ));
        Self::new(service, gate, config)
    }

    pub fn gate(&self) -> &Arc<EnrichmentGate> {
        &self.gate
    }

    /// Aggregate the status of every target.
    ///
    /// Returns exactly one result per target, in request order.
    pub async fn aggregate(&self, targets: &[String]) -> Vec<TargetResult> {
        let tasks = FanoutTask::plan(
            targets,
            self.config.target_stagger(),
            self.config.enrich_definitions,
        );
        let results = join_all(tasks.into_iter().map(|task| self.run_task(task))).await;

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        info!(targets = results.len(), failed, "Aggregation complete");
        results
    }

    #[instrument(skip(self, task), fields(cluster = %task.target, position = task.position))]
    async fn run_task(&self, task: FanoutTask) -> TargetResult {
        if !task.start_delay.is_zero() {
            tokio::time::sleep(task.start_delay).await;
        }

        match self.collect(&task).await {
            Ok(services) => {
                debug!(services = services.len(), "Target collected");
                TargetResult::ok(task.target, services)
            }
            Err((phase, err)) => {
                warn!(phase = %phase, error = %err, "Target pipeline failed");
                TargetResult::failed(task.target, phase, &err)
            }
        }
    }

    async fn collect(&self, task: &FanoutTask) -> Result<Vec<ServiceSummary>, (FanoutPhase, RemoteError)> {
        let arns = self
            .list_all(&task.target)
            .await
            .map_err(|e| (FanoutPhase::List, e))?;
        if arns.is_empty() {
            return Ok(Vec::new());
        }

        let described = self
            .describe_in_batches(&task.target, &arns)
            .await
            .map_err(|e| (FanoutPhase::Describe, e))?;

        if task.includes(FanoutPhase::Enrich) {
            Ok(join_all(described.into_iter().map(|s| self.enrich(s))).await)
        } else {
            Ok(described.into_iter().map(ServiceSummary::from).collect())
        }
    }

    /// Follow continuation tokens until the listing is exhausted.
    async fn list_all(&self, cluster: &str) -> Result<Vec<String>, RemoteError> {
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = with_backoff(&self.config.retry, "list_services", || {
                self.service.list_services(cluster, next_token.clone())
            })
            .await?;
            pages += 1;
            arns.extend(page.service_arns);

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        debug!(cluster, pages, services = arns.len(), "Listing complete");
        Ok(arns)
    }

    /// Describe sequentially in fixed-size batches with a pause between them.
    async fn describe_in_batches(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> Result<Vec<ServiceDescription>, RemoteError> {
        let batch_size = self.config.describe_batch_size.max(1);
        let mut described = Vec::with_capacity(arns.len());

        for (index, batch) in arns.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.inter_batch_delay().is_zero() {
                tokio::time::sleep(self.config.inter_batch_delay()).await;
            }
            let services = with_backoff(&self.config.retry, "describe_services", || {
                self.service.describe_services(cluster, batch)
            })
            .await?;
            described.extend(services);
        }

        Ok(described)
    }

    /// Attach the task definition; a failed lookup only marks this service.
    async fn enrich(&self, service: ServiceDescription) -> ServiceSummary {
        let mut summary = ServiceSummary::from(service);
        let Some(reference) = summary.task_definition.clone() else {
            return summary;
        };

        let lookup = async {
            let _permit = match self.gate.acquire().await {
                Ok(permit) => permit,
                Err(closed) => return Err(closed.to_string()),
            };
            with_backoff(&self.config.retry, "describe_task_definition", || {
                self.service.describe_task_definition(&reference)
            })
            .await
            .map_err(|e| e.user_message())
        };

        match lookup.await {
            Ok(definition) => summary.definition = Some(definition),
            Err(reason) => {
                warn!(service = %summary.name, task_definition = %reference, %reason, "Enrichment failed");
                summary.enrichment_error = Some(reason);
            }
        }
        summary
    }

    /// Force a new deployment of each service, independently.
    ///
    /// Calls pass through the redeploy gate, so at most
    /// `max_concurrent_redeploys` are in flight and starts are spaced by
    /// `redeploy_spacing_ms`. Results come back in input order; one failure
    /// never blocks the others.
    #[instrument(skip(self, services), fields(services = services.len()))]
    pub async fn redeploy(&self, cluster: &str, services: &[String]) -> Vec<ItemResult> {
        let attempts = services.iter().map(|service| async move {
            let outcome = match self.redeploy_gate.acquire().await {
                Ok(_permit) => {
                    with_backoff(&self.config.retry, "force_redeploy", || {
                        self.service.force_redeploy(cluster, service)
                    })
                    .await
                }
                Err(closed) => Err(RemoteError::Unknown(closed.to_string())),
            };

            match outcome {
                Ok(()) => {
                    info!(service = %service, "Redeploy started");
                    ItemResult {
                        item: service.clone(),
                        success: true,
                        message: format!("Deployment of {} started", service),
                    }
                }
                Err(err) => {
                    warn!(service = %service, error = %err, "Redeploy failed");
                    ItemResult {
                        item: service.clone(),
                        success: false,
                        message: err.user_message(),
                    }
                }
            }
        });
        join_all(attempts).await
    }
}
