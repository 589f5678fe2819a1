use rusqlite::{OptionalExtension, params};

use crate::Db;
use crate::error::Result;
use crate::helpers::row_to_lease;
use crate::types::Lease;

impl Db {
    /// Takes or renews the singleton lease.
    ///
    /// Succeeds when no lease exists, the current one has expired, or
    /// `holder_id` already holds it. The conditional upsert makes the check
    /// and the write one atomic statement.
    pub fn try_acquire_lease(&mut self, holder_id: &str, now_ms: i64, ttl_ms: i64) -> Result<bool> {
        let expires_at_ms = now_ms.saturating_add(ttl_ms);
        self.write(|tx| {
            let changed = tx.execute(
                r#"
                INSERT INTO collector_lease (id, holder_id, acquired_at_ms, expires_at_ms)
                VALUES (1, ?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                  holder_id = excluded.holder_id,
                  acquired_at_ms = CASE
                    WHEN collector_lease.holder_id = excluded.holder_id
                      THEN collector_lease.acquired_at_ms
                    ELSE excluded.acquired_at_ms
                  END,
                  expires_at_ms = excluded.expires_at_ms
                WHERE collector_lease.expires_at_ms <= ?2
                   OR collector_lease.holder_id = excluded.holder_id
                "#,
                params![holder_id, now_ms, expires_at_ms],
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes the lease if `holder_id` holds it. Returns whether a row was
    /// removed.
    pub fn release_lease(&mut self, holder_id: &str) -> Result<bool> {
        self.write(|tx| {
            let removed = tx.execute(
                "DELETE FROM collector_lease WHERE id = 1 AND holder_id = ?1",
                params![holder_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn current_lease(&self) -> Result<Option<Lease>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT holder_id, acquired_at_ms, expires_at_ms FROM collector_lease WHERE id = 1",
                    [],
                    row_to_lease,
                )
                .optional()?)
        })
    }
}
