//! Scriptable in-memory remote service for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{
    ContainerService, DataPoint, MetricQuery, MetricSource, RemoteError, ServiceDescription,
    ServicePage, TaskDefinition, TimeSeries,
};

pub(crate) struct FakeFleet {
    clusters: HashMap<String, Vec<ServiceDescription>>,
    page_size: usize,
    /// Remaining throttled failures per call key
    throttles: Mutex<HashMap<String, u32>>,
    listing_failures: HashMap<String, RemoteError>,
    redeploy_failures: HashMap<String, RemoteError>,
    definition_failures: HashSet<String>,
    definition_delay: Duration,
    listing_delays: HashMap<String, Duration>,
    redeploy_delay: Duration,
    connectivity: Option<RemoteError>,

    pub(crate) list_calls: AtomicUsize,
    pub(crate) describe_batches: Mutex<Vec<(usize, Instant)>>,
    pub(crate) definition_calls: AtomicUsize,
    pub(crate) redeploy_calls: AtomicUsize,
    pub(crate) metric_calls: AtomicUsize,
    pub(crate) first_list_at: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
    pub(crate) redeploy_starts: Mutex<Vec<Instant>>,
    redeploys_in_flight: AtomicUsize,
    pub(crate) max_redeploys_in_flight: AtomicUsize,
}

impl FakeFleet {
    pub(crate) fn new() -> Self {
        Self {
            clusters: HashMap::new(),
            page_size: 10,
            throttles: Mutex::new(HashMap::new()),
            listing_failures: HashMap::new(),
            redeploy_failures: HashMap::new(),
            definition_failures: HashSet::new(),
            definition_delay: Duration::ZERO,
            listing_delays: HashMap::new(),
            redeploy_delay: Duration::ZERO,
            connectivity: None,
            list_calls: AtomicUsize::new(0),
            describe_batches: Mutex::new(Vec::new()),
            definition_calls: AtomicUsize::new(0),
            redeploy_calls: AtomicUsize::new(0),
            metric_calls: AtomicUsize::new(0),
            first_list_at: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            redeploy_starts: Mutex::new(Vec::new()),
            redeploys_in_flight: AtomicUsize::new(0),
            max_redeploys_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn service_arn(cluster: &str, index: usize) -> String {
        format!("arn:aws:ecs:eu-west-1:123456789012:service/{cluster}/svc-{index}")
    }

    pub(crate) fn with_cluster(mut self, cluster: &str, services: usize) -> Self {
        let described = (0..services)
            .map(|i| ServiceDescription {
                arn: Self::service_arn(cluster, i),
                name: format!("svc-{i}"),
                status: "ACTIVE".to_string(),
                desired_count: 2,
                running_count: 2,
                pending_count: 0,
                task_definition: Some(format!(
                    "arn:aws:ecs:eu-west-1:123456789012:task-definition/svc-{i}:3"
                )),
            })
            .collect();
        self.clusters.insert(cluster.to_string(), described);
        self
    }

    pub(crate) fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Fail the next `times` calls for `key` with a throttling error.
    pub(crate) fn throttle(self, key: &str, times: u32) -> Self {
        self.throttles.lock().insert(key.to_string(), times);
        self
    }

    pub(crate) fn fail_listing(mut self, cluster: &str, error: RemoteError) -> Self {
        self.listing_failures.insert(cluster.to_string(), error);
        self
    }

    pub(crate) fn fail_redeploy(mut self, service: &str, error: RemoteError) -> Self {
        self.redeploy_failures.insert(service.to_string(), error);
        self
    }

    pub(crate) fn fail_definition(mut self, task_definition: &str) -> Self {
        self.definition_failures.insert(task_definition.to_string());
        self
    }

    pub(crate) fn with_definition_delay(mut self, delay: Duration) -> Self {
        self.definition_delay = delay;
        self
    }

    /// Delay applied to every listing call for `cluster`.
    pub(crate) fn with_listing_delay(mut self, cluster: &str, delay: Duration) -> Self {
        self.listing_delays.insert(cluster.to_string(), delay);
        self
    }

    pub(crate) fn with_redeploy_delay(mut self, delay: Duration) -> Self {
        self.redeploy_delay = delay;
        self
    }

    pub(crate) fn disconnected(mut self, error: RemoteError) -> Self {
        self.connectivity = Some(error);
        self
    }

    pub(crate) fn describe_call_count(&self) -> usize {
        self.describe_batches.lock().len()
    }

    fn take_throttle(&self, key: &str) -> Result<(), RemoteError> {
        let mut throttles = self.throttles.lock();
        if let Some(remaining) = throttles.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Throttled(format!("{key}: rate exceeded")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerService for FakeFleet {
    async fn list_services(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<ServicePage, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut first = self.first_list_at.lock();
            if !first.iter().any(|(c, _)| c == cluster) {
                first.push((cluster.to_string(), Instant::now()));
            }
        }
        if let Some(delay) = self.listing_delays.get(cluster) {
            tokio::time::sleep(*delay).await;
        }
        self.take_throttle("list_services")?;
        if let Some(err) = self.listing_failures.get(cluster) {
            return Err(err.clone());
        }

        let services = self
            .clusters
            .get(cluster)
            .ok_or_else(|| RemoteError::NotFound(format!("cluster {cluster}")))?;

        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| RemoteError::Unknown("invalid token".to_string()))?,
            None => 0,
        };
        let end = (start + self.page_size).min(services.len());
        Ok(ServicePage {
            service_arns: services[start..end].iter().map(|s| s.arn.clone()).collect(),
            next_token: (end < services.len()).then(|| end.to_string()),
        })
    }

    async fn describe_services(
        &self,
        cluster: &str,
        service_arns: &[String],
    ) -> Result<Vec<ServiceDescription>, RemoteError> {
        self.describe_batches
            .lock()
            .push((service_arns.len(), Instant::now()));
        self.take_throttle("describe_services")?;

        let services = self
            .clusters
            .get(cluster)
            .ok_or_else(|| RemoteError::NotFound(format!("cluster {cluster}")))?;
        Ok(service_arns
            .iter()
            .filter_map(|arn| services.iter().find(|s| &s.arn == arn).cloned())
            .collect())
    }

    async fn describe_task_definition(
        &self,
        task_definition: &str,
    ) -> Result<TaskDefinition, RemoteError> {
        self.definition_calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.definition_delay.is_zero() {
            tokio::time::sleep(self.definition_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.take_throttle("describe_task_definition")?;
        if self.definition_failures.contains(task_definition) {
            return Err(RemoteError::NotFound(task_definition.to_string()));
        }

        let family = task_definition
            .rsplit('/')
            .next()
            .and_then(|tail| tail.split(':').next())
            .unwrap_or("unknown")
            .to_string();
        Ok(TaskDefinition {
            arn: task_definition.to_string(),
            family: family.clone(),
            revision: 3,
            cpu: Some("256".to_string()),
            memory: Some("512".to_string()),
            images: vec![format!("registry.example.com/{family}:latest")],
        })
    }

    async fn force_redeploy(&self, _cluster: &str, service: &str) -> Result<(), RemoteError> {
        self.redeploy_calls.fetch_add(1, Ordering::SeqCst);
        self.redeploy_starts.lock().push(Instant::now());
        let now_in_flight = self.redeploys_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_redeploys_in_flight
            .fetch_max(now_in_flight, Ordering::SeqCst);
        if !self.redeploy_delay.is_zero() {
            tokio::time::sleep(self.redeploy_delay).await;
        }
        self.redeploys_in_flight.fetch_sub(1, Ordering::SeqCst);

        self.take_throttle(&format!("force_redeploy:{service}"))?;
        match self.redeploy_failures.get(service) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn test_connectivity(&self) -> Result<(), RemoteError> {
        match &self.connectivity {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetricSource for FakeFleet {
    async fn metric_series(&self, query: &MetricQuery) -> Result<TimeSeries, RemoteError> {
        self.metric_calls.fetch_add(1, Ordering::SeqCst);
        self.take_throttle("metric_series")?;

        let step = ChronoDuration::seconds(query.period_secs as i64);
        let mut points = Vec::new();
        let mut at = query.range.start;
        while at < query.range.end {
            points.push(DataPoint {
                timestamp: at,
                value: 42.0,
            });
            at += step;
        }
        Ok(TimeSeries {
            label: query.kind.metric_name().to_string(),
            points,
        })
    }
}
