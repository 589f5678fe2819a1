use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ingest::IngestStats;
use tokentop_db::{
    CachedMetric, Db, FileAggregate, RecentSample, RetryPolicy, StoreStats, WindowAggregate,
};

use crate::error::{AppError, Result};

/// Owned handle to the metrics cache.
///
/// Built once at startup and passed by reference to whatever collects from
/// it. When the store cannot be opened the handle stays usable: every
/// operation becomes a no-op returning an empty value, and
/// [`UsageCache::unavailable_reason`] explains why.
pub struct UsageCache {
    db: Option<Db>,
    path: PathBuf,
    unavailable: Option<String>,
}

impl UsageCache {
    /// Opens and migrates the store at `path`. Never fails.
    pub fn open(path: impl AsRef<Path>, retry: RetryPolicy) -> Self {
        let path = path.as_ref().to_path_buf();
        match open_store(&path, retry) {
            Ok(db) => {
                tracing::debug!(path = %path.display(), "metrics cache opened");
                Self {
                    db: Some(db),
                    path,
                    unavailable: None,
                }
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "metrics cache unavailable, running without it"
                );
                Self {
                    db: None,
                    path,
                    unavailable: Some(format!("metrics cache unavailable: {err}")),
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.db.is_some()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ingest_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> IngestStats {
        match self.db.as_mut() {
            Some(db) => ingest::ingest_files(db, paths),
            None => IngestStats::default(),
        }
    }

    pub fn ingest_projects_dir(&mut self, root: &Path) -> IngestStats {
        match self.db.as_mut() {
            Some(db) => ingest::ingest_projects_dir(db, root),
            None => IngestStats::default(),
        }
    }

    /// Compacts every tracked file whose last seen mtime is older than
    /// `now - quiet_period`. Files changed on disk since their bookmark are
    /// left for the next ingest. Returns how many files were compacted.
    pub fn compact_idle_files(&mut self, now: SystemTime, quiet_period: Duration) -> Result<usize> {
        let Some(db) = self.db.as_mut() else {
            return Ok(0);
        };
        let cutoff = now
            .checked_sub(quiet_period)
            .and_then(|cutoff| cutoff.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let now_unix = unix_seconds(now);
        let mut compacted = 0usize;
        for state in db.list_idle_files(cutoff)? {
            if !ingest::is_settled(&state) {
                tracing::debug!(file = %state.source_file, "unread changes, compaction deferred");
                continue;
            }
            db.mark_complete(&state.source_file, now_unix)?;
            compacted += 1;
        }
        if compacted > 0 {
            tracing::info!(files = compacted, "idle files compacted");
        }
        Ok(compacted)
    }

    pub fn mark_complete(&mut self, source_file: &str, now_unix: i64) -> Result<Option<FileAggregate>> {
        match self.db.as_mut() {
            Some(db) => Ok(Some(db.mark_complete(source_file, now_unix)?)),
            None => Ok(None),
        }
    }

    pub fn mark_active(&mut self, source_file: &str) -> Result<bool> {
        match self.db.as_mut() {
            Some(db) => Ok(db.mark_active(source_file)?),
            None => Ok(false),
        }
    }

    pub fn query_window(&self, since_unix: i64) -> Result<WindowAggregate> {
        match self.db.as_ref() {
            Some(db) => Ok(db.query_window(since_unix)?),
            None => Ok(WindowAggregate::default()),
        }
    }

    pub fn query_recent(&self, now_unix: i64, window_secs: i64) -> Result<Vec<RecentSample>> {
        match self.db.as_ref() {
            Some(db) => Ok(db.query_recent(now_unix, window_secs)?),
            None => Ok(Vec::new()),
        }
    }

    /// Without a store there is nobody to coordinate with, so the caller
    /// leads.
    pub fn try_acquire_lease(&mut self, holder_id: &str, now_ms: i64, ttl_ms: i64) -> Result<bool> {
        match self.db.as_mut() {
            Some(db) => Ok(db.try_acquire_lease(holder_id, now_ms, ttl_ms)?),
            None => Ok(true),
        }
    }

    pub fn release_lease(&mut self, holder_id: &str) -> Result<bool> {
        match self.db.as_mut() {
            Some(db) => Ok(db.release_lease(holder_id)?),
            None => Ok(false),
        }
    }

    pub fn cached_metric(&self, metric_type: &str) -> Result<Option<CachedMetric>> {
        match self.db.as_ref() {
            Some(db) => Ok(db.get_cached_metric(metric_type)?),
            None => Ok(None),
        }
    }

    pub fn store_metric(&mut self, metric_type: &str, payload: &str, now_ms: i64) -> Result<()> {
        match self.db.as_mut() {
            Some(db) => Ok(db.set_cached_metric(metric_type, payload, now_ms)?),
            None => Ok(()),
        }
    }

    /// Wipes every table. Callers re-ingest on the next cycle.
    pub fn reset(&mut self) -> Result<()> {
        match self.db.as_mut() {
            Some(db) => Ok(db.clear_all()?),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> Result<StoreStats> {
        match self.db.as_ref() {
            Some(db) => Ok(db.stats()?),
            None => Ok(StoreStats::default()),
        }
    }

    pub fn close(self) -> Result<()> {
        match self.db {
            Some(db) => db.close().map_err(AppError::from),
            None => Ok(()),
        }
    }
}

fn open_store(path: &Path, retry: RetryPolicy) -> Result<Db> {
    let mut db = Db::open_with(path, retry)?;
    db.migrate()?;
    Ok(db)
}

pub(crate) fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
