use rusqlite::{OptionalExtension, params};

use crate::Db;
use crate::error::Result;
use crate::types::CachedMetric;

impl Db {
    /// Returns the stored entry regardless of age; callers decide freshness
    /// with [`CachedMetric::is_fresh`].
    pub fn get_cached_metric(&self, metric_type: &str) -> Result<Option<CachedMetric>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    r#"
                    SELECT metric_type, payload, updated_at_ms
                    FROM metrics_cache
                    WHERE metric_type = ?1
                    "#,
                    params![metric_type],
                    |row| {
                        Ok(CachedMetric {
                            metric_type: row.get(0)?,
                            payload: row.get(1)?,
                            updated_at_ms: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    pub fn set_cached_metric(&mut self, metric_type: &str, payload: &str, now_ms: i64) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                r#"
                INSERT INTO metrics_cache (metric_type, payload, updated_at_ms)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(metric_type) DO UPDATE SET
                  payload = excluded.payload,
                  updated_at_ms = excluded.updated_at_ms
                "#,
                params![metric_type, payload, now_ms],
            )?;
            Ok(())
        })
    }
}
