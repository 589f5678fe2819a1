use tokentop_core::{ModelBreakdown, TokenCounts};

/// Ingestion bookmark for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub source_file: String,
    pub last_line: u64,
    pub mtime_ns: i64,
    pub updated_at: i64,
}

/// Compacted totals for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAggregate {
    pub source_file: String,
    pub is_complete: bool,
    pub completed_at: Option<i64>,
    pub totals: TokenCounts,
    pub event_count: u64,
    pub earliest_unix: Option<i64>,
    pub latest_unix: Option<i64>,
    pub models: ModelBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub holder_id: String,
    pub acquired_at_ms: i64,
    pub expires_at_ms: i64,
}

impl Lease {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMetric {
    pub metric_type: String,
    pub payload: String,
    pub updated_at_ms: i64,
}

impl CachedMetric {
    pub fn is_fresh(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms.saturating_sub(self.updated_at_ms) < ttl_ms
    }
}

/// Result of a hybrid window query: compacted files plus live events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowAggregate {
    pub totals: TokenCounts,
    pub event_count: u64,
    pub earliest_unix: Option<i64>,
    pub latest_unix: Option<i64>,
    pub models: ModelBreakdown,
    pub compacted_files: usize,
}

impl WindowAggregate {
    pub(crate) fn widen(&mut self, earliest: Option<i64>, latest: Option<i64>) {
        self.earliest_unix = match (self.earliest_unix, earliest) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.latest_unix = match (self.latest_unix, latest) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// One raw event reduced to its time and token sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentSample {
    pub timestamp_unix: i64,
    pub tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub token_events: u64,
    pub file_states: u64,
    pub file_aggregates: u64,
    pub complete_aggregates: u64,
    pub metrics_cache_entries: u64,
}
