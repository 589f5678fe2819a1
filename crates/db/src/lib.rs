mod aggregates;
mod error;
mod events;
mod file_state;
mod helpers;
mod lease;
mod metrics_cache;
mod migrations;
mod query;
mod retry;
mod types;

use std::path::Path;

use rusqlite::{Connection, Transaction, TransactionBehavior};

pub use error::{DbError, Result};
pub use migrations::MIGRATIONS;
pub use retry::{RetryPolicy, with_retry};
pub use types::{
    CachedMetric, FileAggregate, FileState, Lease, RecentSample, StoreStats, WindowAggregate,
};

/// Handle to the shared metrics cache file.
///
/// Every public operation runs through the retry executor, and every write
/// runs in an `IMMEDIATE` transaction so lock conflicts surface at `BEGIN`
/// instead of mid-transaction.
pub struct Db {
    conn: Connection,
    retry: RetryPolicy,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, RetryPolicy::default())
    }

    pub fn open_with(path: impl AsRef<Path>, retry: RetryPolicy) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(retry.busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "cache_size", -20_000)?;
        conn.pragma_update(None, "mmap_size", 268_435_456i64)?;
        Ok(Self { conn, retry })
    }

    /// Checkpoints the WAL and closes the connection.
    pub fn close(self) -> Result<()> {
        let _ = self
            .conn
            .execute_batch("PRAGMA wal_checkpoint(PASSIVE);");
        self.conn.close().map_err(|(_, err)| DbError::from(err))
    }

    /// Runs `op` inside an immediate transaction, retrying on contention.
    pub(crate) fn write<T>(
        &mut self,
        mut op: impl FnMut(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let policy = self.retry;
        let conn = &mut self.conn;
        with_retry(&policy, || {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = op(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Runs `op` inside a deferred read transaction so multi-statement reads
    /// observe one snapshot.
    pub(crate) fn read<T>(&self, mut op: impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        let policy = self.retry;
        let conn = &self.conn;
        with_retry(&policy, || {
            let tx = conn.unchecked_transaction()?;
            let value = op(&tx)?;
            tx.finish()?;
            Ok(value)
        })
    }

    /// Removes every row from every table. Used by reset paths and tests.
    pub fn clear_all(&mut self) -> Result<()> {
        self.write(|tx| {
            tx.execute_batch(
                r#"
                DELETE FROM token_events;
                DELETE FROM file_state;
                DELETE FROM file_aggregates;
                DELETE FROM collector_lease;
                DELETE FROM metrics_cache;
                "#,
            )?;
            Ok(())
        })?;
        tracing::info!("metrics cache wiped");
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.read(|conn| {
            let count = |sql: &str| -> Result<u64> {
                Ok(conn.query_row(sql, [], |row| row.get::<_, i64>(0))?.max(0) as u64)
            };
            Ok(StoreStats {
                token_events: count("SELECT COUNT(*) FROM token_events")?,
                file_states: count("SELECT COUNT(*) FROM file_state")?,
                file_aggregates: count("SELECT COUNT(*) FROM file_aggregates")?,
                complete_aggregates: count(
                    "SELECT COUNT(*) FROM file_aggregates WHERE is_complete = 1",
                )?,
                metrics_cache_entries: count("SELECT COUNT(*) FROM metrics_cache")?,
            })
        })
    }
}
