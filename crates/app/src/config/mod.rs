use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokentop_db::RetryPolicy;

pub const DEFAULT_CACHE_DIR: &str = ".tokentop-cache";
pub const DEFAULT_DB_FILE_NAME: &str = "metrics.sqlite";

/// Settings for the metrics cache and its collection cycle.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Relative paths resolve against the working directory.
    pub cache_dir: PathBuf,
    pub db_file_name: String,
    /// Falls back to the host application's projects directory when unset.
    pub projects_dir: Option<PathBuf>,
    pub refresh_interval_secs: u64,
    /// Zero collects since the epoch.
    pub lookback_hours: u64,
    pub rate_window_secs: u64,
    pub lease_ttl_secs: u64,
    pub metrics_cache_ttl_secs: u64,
    /// Files untouched this long are compacted. `None` or zero disables
    /// compaction.
    pub compaction_quiet_period_secs: Option<u64>,
    pub pricing_file: Option<PathBuf>,
    pub retry: RetryConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            projects_dir: None,
            refresh_interval_secs: 2,
            lookback_hours: 24,
            rate_window_secs: 60,
            lease_ttl_secs: 5,
            metrics_cache_ttl_secs: 3,
            compaction_quiet_period_secs: Some(3_600),
            pricing_file: None,
            retry: RetryConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn db_path(&self) -> PathBuf {
        self.cache_dir.join(&self.db_file_name)
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.projects_dir
            .clone()
            .unwrap_or_else(ingest::default_projects_dir)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn lease_ttl_ms(&self) -> i64 {
        secs_to_ms(self.lease_ttl_secs)
    }

    pub fn metrics_cache_ttl_ms(&self) -> i64 {
        secs_to_ms(self.metrics_cache_ttl_secs)
    }

    pub fn compaction_quiet_period(&self) -> Option<Duration> {
        self.compaction_quiet_period_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1_000)).unwrap_or(i64::MAX)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
    pub busy_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            timeout_ms: policy.timeout.as_millis() as u64,
            busy_timeout_ms: policy.busy_timeout.as_millis() as u64,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.initial_delay_ms)),
            timeout: Duration::from_millis(config.timeout_ms),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        }
    }
}
