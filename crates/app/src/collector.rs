use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use ingest::IngestStats;
use tokentop_core::{ModelUsage, PricingRule, UsageSnapshot, compute_cost_usd};

use crate::cache::UsageCache;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::lease::LeaseManager;
use crate::pricing::{load_initial_pricing, resolve_pricing_rules};
use crate::rate::{session_rate, trailing_rate};
use crate::util::time::{lookback_since, unix_to_rfc3339};

/// Metrics cache key for the leader's last snapshot.
pub const SNAPSHOT_METRIC: &str = "snapshot";

/// Runs one collection cycle per call: lease, ingest, compaction, query,
/// snapshot.
pub struct Collector {
    config: CacheConfig,
    pricing: Vec<PricingRule>,
    lease: LeaseManager,
}

impl Collector {
    /// Builds a collector with pricing from the configured file or the
    /// built-in table.
    pub fn new(config: CacheConfig) -> Self {
        let pricing = match resolve_pricing_rules(config.pricing_file.as_deref()) {
            Ok(rules) => rules,
            Err(err) => {
                tracing::warn!(error = %err, "pricing rules unreadable, using defaults");
                load_initial_pricing().unwrap_or_default()
            }
        };
        Self::with_pricing(config, pricing)
    }

    pub fn with_pricing(config: CacheConfig, pricing: Vec<PricingRule>) -> Self {
        let lease = LeaseManager::new(config.lease_ttl_ms());
        Self {
            config,
            pricing,
            lease,
        }
    }

    pub fn with_lease(mut self, lease: LeaseManager) -> Self {
        self.lease = lease;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn lease(&self) -> &LeaseManager {
        &self.lease
    }

    pub fn collect(&mut self, cache: &mut UsageCache) -> UsageSnapshot {
        self.collect_at(cache, Utc::now())
    }

    /// Never fails: cache-layer problems come back in the snapshot's
    /// `error` field with `available` cleared.
    pub fn collect_at(&mut self, cache: &mut UsageCache, now: DateTime<Utc>) -> UsageSnapshot {
        let since = lookback_since(now, self.config.lookback_hours);
        let since_text = format_time(since);
        let collected_at = format_time(now);
        if let Some(reason) = cache.unavailable_reason() {
            return UsageSnapshot::unavailable(since_text, collected_at, reason);
        }

        let now_ms = now.timestamp_millis();
        if !self.lease.try_acquire(cache, now_ms) {
            if let Some(snapshot) = self.cached_snapshot(cache, now_ms) {
                return snapshot;
            }
            return match self.build_snapshot(cache, since, now, None) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    tracing::warn!(error = %err, "query failed");
                    UsageSnapshot::unavailable(since_text, collected_at, err.to_string())
                }
            };
        }

        let stats = cache.ingest_projects_dir(&self.config.projects_dir());
        if let Some(quiet_period) = self.config.compaction_quiet_period() {
            let now_system = SystemTime::from(now);
            if let Err(err) = cache.compact_idle_files(now_system, quiet_period) {
                tracing::warn!(error = %err, "compaction failed");
            }
        }
        match self.build_snapshot(cache, since, now, Some(&stats)) {
            Ok(snapshot) => {
                self.publish(cache, &snapshot, now_ms);
                snapshot
            }
            Err(err) => {
                tracing::warn!(error = %err, "query failed");
                UsageSnapshot::unavailable(since_text, collected_at, err.to_string())
            }
        }
    }

    /// Releases the lease. Call once on shutdown.
    pub fn shutdown(&mut self, cache: &mut UsageCache) {
        self.lease.release(cache);
    }

    fn cached_snapshot(&self, cache: &UsageCache, now_ms: i64) -> Option<UsageSnapshot> {
        let entry = match cache.cached_metric(SNAPSHOT_METRIC) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                tracing::debug!(error = %err, "metrics cache read failed");
                return None;
            }
        };
        if !entry.is_fresh(now_ms, self.config.metrics_cache_ttl_ms()) {
            return None;
        }
        match serde_json::from_str::<UsageSnapshot>(&entry.payload) {
            Ok(mut snapshot) => {
                snapshot.is_leader = false;
                snapshot.from_cache = true;
                Some(snapshot)
            }
            Err(err) => {
                tracing::debug!(error = %err, "cached snapshot unreadable");
                None
            }
        }
    }

    fn publish(&self, cache: &mut UsageCache, snapshot: &UsageSnapshot, now_ms: i64) {
        let payload = match serde_json::to_string(snapshot) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "snapshot serialization failed");
                return;
            }
        };
        if let Err(err) = cache.store_metric(SNAPSHOT_METRIC, &payload, now_ms) {
            tracing::warn!(error = %err, "metrics cache write failed");
        }
    }

    fn build_snapshot(
        &self,
        cache: &UsageCache,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        stats: Option<&IngestStats>,
    ) -> Result<UsageSnapshot> {
        let window = cache.query_window(since.timestamp())?;
        let window_secs = i64::try_from(self.config.rate_window_secs).unwrap_or(i64::MAX);
        let samples = cache.query_recent(now.timestamp(), window_secs)?;

        let mut models = window
            .models
            .iter()
            .map(|(model, totals)| ModelUsage {
                model: model.clone(),
                tokens: totals.tokens,
                total_tokens: totals.tokens.total(),
                event_count: totals.event_count,
                cost_usd: compute_cost_usd(&self.pricing, model, totals.tokens),
            })
            .collect::<Vec<_>>();
        models.sort_by(|a, b| {
            b.total_tokens
                .cmp(&a.total_tokens)
                .then_with(|| a.model.cmp(&b.model))
        });
        let total_cost_usd: f64 = models.iter().filter_map(|model| model.cost_usd).sum();
        let total_tokens = window.totals.total();

        let mut snapshot = UsageSnapshot {
            input_tokens: window.totals.input_tokens,
            output_tokens: window.totals.output_tokens,
            cache_read_tokens: window.totals.cache_read_tokens,
            cache_creation_tokens: window.totals.cache_creation_tokens,
            total_tokens,
            total_cost_usd,
            models,
            earliest: window.earliest_unix.and_then(unix_to_rfc3339),
            latest: window.latest_unix.and_then(unix_to_rfc3339),
            tokens_per_minute: trailing_rate(&samples, window_secs),
            session_tokens_per_minute: session_rate(
                total_tokens,
                window.earliest_unix,
                window.latest_unix,
            ),
            since: format_time(since),
            collected_at: format_time(now),
            is_leader: self.lease.is_leader(),
            from_cache: false,
            files_ingested: 0,
            files_failed: 0,
            available: true,
            error: None,
        };
        if let Some(stats) = stats {
            snapshot.files_ingested = stats.files_ingested;
            snapshot.files_failed = stats.files_failed;
            if let Some(issue) = stats.issues.first() {
                snapshot.error = Some(format!(
                    "{} of {} files failed to ingest ({}: {})",
                    stats.files_failed, stats.files_total, issue.file_path, issue.message
                ));
            }
        }
        Ok(snapshot)
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::IngestIssue;
    use tokentop_db::RetryPolicy;

    #[test]
    fn snapshot_reports_partial_failures() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = UsageCache::open(dir.path().join("metrics.sqlite"), RetryPolicy::default());
        let collector = Collector::with_pricing(CacheConfig::default(), Vec::new());
        let stats = IngestStats {
            files_total: 3,
            files_ingested: 2,
            files_failed: 1,
            issues: vec![IngestIssue {
                file_path: "a.jsonl".to_string(),
                message: "io error: denied".to_string(),
            }],
            ..IngestStats::default()
        };
        let now = Utc::now();

        let snapshot = collector
            .build_snapshot(&cache, now, now, Some(&stats))
            .expect("snapshot");
        assert!(snapshot.available);
        assert_eq!(snapshot.files_ingested, 2);
        assert_eq!(snapshot.files_failed, 1);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("1 of 3 files failed to ingest (a.jsonl: io error: denied)")
        );
    }

    #[test]
    fn unpriced_models_add_no_cost() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = UsageCache::open(dir.path().join("metrics.sqlite"), RetryPolicy::default());
        let collector = Collector::with_pricing(CacheConfig::default(), Vec::new());
        let now = Utc::now();
        let snapshot = collector
            .build_snapshot(&cache, now, now, None)
            .expect("snapshot");
        assert_eq!(snapshot.total_cost_usd, 0.0);
        assert!(snapshot.models.is_empty());
        assert_eq!(snapshot.error, None);
    }
}
