//! Configuration management for Fleetwatch.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FleetwatchError, Result};

/// Main configuration for the governance layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetwatchConfig {
    /// Rate limiter instances and their maintenance
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Fan-out scheduling against the remote service
    #[serde(default)]
    pub fanout: FanoutConfig,

    /// Input validation
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Gateway behaviour
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Configuration for the rate limiter instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Limiter for listing, status and redeploy requests
    #[serde(default)]
    pub general: LimiterConfig,

    /// Stricter limiter for metric queries
    #[serde(default = "default_metrics_limiter")]
    pub metrics: LimiterConfig,

    /// How often expired entries are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            general: LimiterConfig::default(),
            metrics: default_metrics_limiter(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl LimitsConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_metrics_limiter() -> LimiterConfig {
    LimiterConfig {
        max_requests: 30,
        ..LimiterConfig::default()
    }
}

fn default_sweep_interval() -> u64 {
    300
}

/// Quota and punishment settings for one rate limiter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Block length in milliseconds once an identifier is blocked
    #[serde(default = "default_block_duration_ms")]
    pub block_duration_ms: u64,

    /// Over-quota windows tolerated before blocking
    #[serde(default = "default_max_violations")]
    pub max_violations: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            block_duration_ms: default_block_duration_ms(),
            max_violations: default_max_violations(),
        }
    }
}

/// Longest accepted window or block, in milliseconds (30 days).
pub const MAX_LIMITER_DURATION_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Longest accepted retry delay or jitter, in milliseconds (1 hour).
pub const MAX_RETRY_DELAY_MS: u64 = 60 * 60 * 1000;

/// Saturates at `chrono::Duration::MAX` for values it cannot represent.
fn chrono_millis(ms: u64) -> chrono::Duration {
    i64::try_from(ms)
        .ok()
        .and_then(chrono::Duration::try_milliseconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl LimiterConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono_millis(self.window_ms)
    }

    pub fn block_duration(&self) -> chrono::Duration {
        chrono_millis(self.block_duration_ms)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.max_requests == 0 {
            return Err(FleetwatchError::Config(format!(
                "limits.{name}.max_requests must be greater than zero"
            )));
        }
        if self.window_ms == 0 {
            return Err(FleetwatchError::Config(format!(
                "limits.{name}.window_ms must be greater than zero"
            )));
        }
        if self.max_violations == 0 {
            return Err(FleetwatchError::Config(format!(
                "limits.{name}.max_violations must be greater than zero"
            )));
        }
        if self.window_ms > MAX_LIMITER_DURATION_MS {
            return Err(FleetwatchError::Config(format!(
                "limits.{name}.window_ms must not exceed {MAX_LIMITER_DURATION_MS}"
            )));
        }
        if self.block_duration_ms > MAX_LIMITER_DURATION_MS {
            return Err(FleetwatchError::Config(format!(
                "limits.{name}.block_duration_ms must not exceed {MAX_LIMITER_DURATION_MS}"
            )));
        }
        Ok(())
    }
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_block_duration_ms() -> u64 {
    15 * 60_000
}

fn default_max_violations() -> u32 {
    3
}

/// Fan-out scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Identifiers per describe call (the remote service accepts at most 10)
    #[serde(default = "default_batch_size")]
    pub describe_batch_size: usize,

    /// Pause between consecutive describe batches, in milliseconds
    #[serde(default = "default_inter_batch_delay")]
    pub inter_batch_delay_ms: u64,

    /// Start offset added per target position, in milliseconds
    #[serde(default = "default_target_stagger")]
    pub target_stagger_ms: u64,

    /// Process-wide cap on in-flight enrichment lookups
    #[serde(default = "default_max_concurrent_enrichments")]
    pub max_concurrent_enrichments: usize,

    /// Minimum spacing between enrichment acquisitions, in milliseconds
    #[serde(default = "default_enrichment_spacing")]
    pub min_enrichment_spacing_ms: u64,

    /// Cap on in-flight redeploy calls
    #[serde(default = "default_max_concurrent_redeploys")]
    pub max_concurrent_redeploys: usize,

    /// Minimum spacing between redeploy calls, in milliseconds
    #[serde(default = "default_redeploy_spacing")]
    pub redeploy_spacing_ms: u64,

    /// Whether to look up task definitions for described services
    #[serde(default = "default_true")]
    pub enrich_definitions: bool,

    /// Retry policy for throttled calls
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            describe_batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay(),
            target_stagger_ms: default_target_stagger(),
            max_concurrent_enrichments: default_max_concurrent_enrichments(),
            min_enrichment_spacing_ms: default_enrichment_spacing(),
            max_concurrent_redeploys: default_max_concurrent_redeploys(),
            redeploy_spacing_ms: default_redeploy_spacing(),
            enrich_definitions: true,
            retry: RetryConfig::default(),
        }
    }
}

impl FanoutConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn target_stagger(&self) -> Duration {
        Duration::from_millis(self.target_stagger_ms)
    }

    pub fn min_enrichment_spacing(&self) -> Duration {
        Duration::from_millis(self.min_enrichment_spacing_ms)
    }

    pub fn redeploy_spacing(&self) -> Duration {
        Duration::from_millis(self.redeploy_spacing_ms)
    }
}

/// Largest batch the remote describe call accepts.
pub const MAX_DESCRIBE_BATCH: usize = 10;

fn default_batch_size() -> usize {
    MAX_DESCRIBE_BATCH
}

fn default_inter_batch_delay() -> u64 {
    100
}

fn default_target_stagger() -> u64 {
    200
}

fn default_max_concurrent_enrichments() -> usize {
    5
}

fn default_enrichment_spacing() -> u64 {
    50
}

fn default_max_concurrent_redeploys() -> usize {
    3
}

fn default_redeploy_spacing() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

/// Exponential backoff settings for throttled remote calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Upper bound on the exponential part of the delay, in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Upper bound on the random jitter added to each delay, in milliseconds
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter_ms: default_jitter(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(FleetwatchError::Config(
                "fanout.retry.max_attempts must be greater than zero".to_string(),
            ));
        }
        for (field, value) in [
            ("base_delay_ms", self.base_delay_ms),
            ("max_delay_ms", self.max_delay_ms),
            ("jitter_ms", self.jitter_ms),
        ] {
            if value > MAX_RETRY_DELAY_MS {
                return Err(FleetwatchError::Config(format!(
                    "fanout.retry.{field} must not exceed {MAX_RETRY_DELAY_MS}"
                )));
            }
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay() -> u64 {
    200
}

fn default_max_delay() -> u64 {
    5_000
}

fn default_jitter() -> u64 {
    100
}

/// Input validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Target (cluster) names callers may query
    #[serde(default)]
    pub allowed_targets: Vec<String>,

    /// Maximum identifier length in characters
    #[serde(default = "default_max_identifier_length")]
    pub max_identifier_length: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_targets: Vec::new(),
            max_identifier_length: default_max_identifier_length(),
        }
    }
}

fn default_max_identifier_length() -> usize {
    255
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Overall deadline for one gateway operation, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Characters of the client agent kept in a caller identifier
    #[serde(default = "default_user_agent_max_len")]
    pub user_agent_max_len: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            user_agent_max_len: default_user_agent_max_len(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_user_agent_max_len() -> usize {
    50
}

impl FleetwatchConfig {
    /// Load configuration from a file path.
    ///
    /// The format is picked from the file extension (YAML, TOML or JSON).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        if !path.exists() {
            return Err(FleetwatchError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }

        let config: FleetwatchConfig = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| FleetwatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FleetwatchConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FleetwatchError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the effective configuration back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| FleetwatchError::Config(e.to_string()))
    }

    /// Reject values the governance layer cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.limits.general.validate("general")?;
        self.limits.metrics.validate("metrics")?;

        if self.limits.sweep_interval_secs == 0 {
            return Err(FleetwatchError::Config(
                "limits.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.fanout.describe_batch_size == 0
            || self.fanout.describe_batch_size > MAX_DESCRIBE_BATCH
        {
            return Err(FleetwatchError::Config(format!(
                "fanout.describe_batch_size must be between 1 and {}",
                MAX_DESCRIBE_BATCH
            )));
        }
        if self.fanout.max_concurrent_enrichments == 0 {
            return Err(FleetwatchError::Config(
                "fanout.max_concurrent_enrichments must be greater than zero".to_string(),
            ));
        }
        if self.fanout.max_concurrent_redeploys == 0 {
            return Err(FleetwatchError::Config(
                "fanout.max_concurrent_redeploys must be greater than zero".to_string(),
            ));
        }
        self.fanout.retry.validate()?;
        if self.validation.max_identifier_length == 0 {
            return Err(FleetwatchError::Config(
                "validation.max_identifier_length must be greater than zero".to_string(),
            ));
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(FleetwatchError::Config(
                "gateway.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FleetwatchConfig::default();
        assert_eq!(config.limits.general.max_requests, 100);
        assert_eq!(config.limits.metrics.max_requests, 30);
        assert_eq!(config.limits.general.max_violations, 3);
        assert_eq!(config.fanout.describe_batch_size, 10);
        assert_eq!(config.gateway.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
limits:
  general:
    max_requests: 10
  sweep_interval_secs: 60
fanout:
  describe_batch_size: 5
  retry:
    max_attempts: 2
validation:
  allowed_targets:
    - production
    - staging
"#;
        let config = FleetwatchConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limits.general.max_requests, 10);
        assert_eq!(config.limits.general.window_ms, 60_000);
        assert_eq!(config.limits.metrics.max_requests, 30);
        assert_eq!(config.limits.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.fanout.describe_batch_size, 5);
        assert_eq!(config.fanout.retry.max_attempts, 2);
        assert_eq!(config.fanout.retry.base_delay_ms, 200);
        assert_eq!(config.validation.allowed_targets, vec!["production", "staging"]);
    }

    #[test]
    fn test_rejects_oversized_batch() {
        let yaml = r#"
fanout:
  describe_batch_size: 25
"#;
        let err = FleetwatchConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, FleetwatchError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_quota() {
        let yaml = r#"
limits:
  metrics:
    max_requests: 0
"#;
        let err = FleetwatchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("limits.metrics.max_requests"));
    }

    #[test]
    fn test_rejects_unbounded_limiter_durations() {
        let yaml = r#"
limits:
  general:
    max_requests: 1
    max_violations: 1
    block_duration_ms: 10000000000000000
"#;
        let err = FleetwatchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("limits.general.block_duration_ms"));

        let yaml = r#"
limits:
  metrics:
    window_ms: 18446744073709551615
"#;
        let err = FleetwatchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("limits.metrics.window_ms"));

        let mut config = FleetwatchConfig::default();
        config.limits.general.window_ms = MAX_LIMITER_DURATION_MS;
        config.limits.general.block_duration_ms = MAX_LIMITER_DURATION_MS;
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.general.window(), chrono::Duration::days(30));
    }

    #[test]
    fn test_rejects_unbounded_retry_delays() {
        let yaml = r#"
fanout:
  retry:
    max_delay_ms: 18446744073709551615
"#;
        let err = FleetwatchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("fanout.retry.max_delay_ms"));

        let mut config = FleetwatchConfig::default();
        config.fanout.retry.jitter_ms = MAX_RETRY_DELAY_MS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_millis_saturate() {
        let config = LimiterConfig {
            window_ms: u64::MAX,
            ..LimiterConfig::default()
        };
        assert_eq!(config.window(), chrono::Duration::MAX);
    }

    #[test]
    fn test_yaml_round_trip_of_effective_config() {
        let yaml = FleetwatchConfig::default().to_yaml().unwrap();
        let parsed = FleetwatchConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.limits.general, LimiterConfig::default());
    }

    #[test]
    fn test_from_file() {
        let dir = std::env::temp_dir().join(format!("fleetwatch-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fleetwatch.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "limits:\n  general:\n    max_requests: 7\nvalidation:\n  allowed_targets: [prod]"
        )
        .unwrap();

        let config = FleetwatchConfig::from_file(&path).unwrap();
        assert_eq!(config.limits.general.max_requests, 7);
        assert_eq!(config.validation.allowed_targets, vec!["prod"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_from_missing_file() {
        let err = FleetwatchConfig::from_file("/nonexistent/fleetwatch.yaml").unwrap_err();
        assert!(matches!(err, FleetwatchError::Io(_)));
    }
}
