use rusqlite::{Connection, params};
use tokentop_core::{ModelTotals, merge_breakdowns};

use crate::Db;
use crate::error::Result;
use crate::helpers::{AGGREGATE_COLUMNS, from_sql_count, row_to_aggregate_row, row_to_token_counts};
use crate::types::{RecentSample, WindowAggregate};

/// Adds every aggregate row whose latest event is inside the window.
///
/// Rows reactivated by `mark_active` are included too: their totals are the
/// floor for events that no longer exist as raw rows.
fn add_compacted(conn: &Connection, since_unix: i64, window: &mut WindowAggregate) -> Result<()> {
    let sql = format!("SELECT {AGGREGATE_COLUMNS} FROM file_aggregates WHERE latest_unix >= ?1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![since_unix], row_to_aggregate_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for row in rows {
        let aggregate = row.decode()?;
        window.totals.add(aggregate.totals);
        window.event_count += aggregate.event_count;
        window.widen(aggregate.earliest_unix, aggregate.latest_unix);
        merge_breakdowns(&mut window.models, &aggregate.models);
        window.compacted_files += 1;
    }
    Ok(())
}

fn add_live(conn: &Connection, since_unix: i64, window: &mut WindowAggregate) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT model,
               SUM(input_tokens), SUM(output_tokens),
               SUM(cache_read_tokens), SUM(cache_creation_tokens),
               COUNT(*), MIN(timestamp_unix), MAX(timestamp_unix)
        FROM token_events
        WHERE timestamp_unix >= ?1
        GROUP BY model
        "#,
    )?;
    let mut rows = stmt.query(params![since_unix])?;
    while let Some(row) = rows.next()? {
        let model: String = row.get(0)?;
        let totals = ModelTotals {
            tokens: row_to_token_counts(row, 1)?,
            event_count: from_sql_count(row.get(5)?),
        };
        window.totals.add(totals.tokens);
        window.event_count += totals.event_count;
        window.widen(row.get(6)?, row.get(7)?);
        window.models.entry(model).or_default().add(totals);
    }
    Ok(())
}

impl Db {
    /// Hybrid aggregate since `since_unix`: compacted file summaries merged
    /// with sums over raw events, per-model breakdowns summed by key.
    pub fn query_window(&self, since_unix: i64) -> Result<WindowAggregate> {
        self.read(|conn| {
            let mut window = WindowAggregate::default();
            add_compacted(conn, since_unix, &mut window)?;
            add_live(conn, since_unix, &mut window)?;
            Ok(window)
        })
    }

    /// Raw `(timestamp, token sum)` samples inside the trailing window,
    /// oldest first.
    pub fn query_recent(&self, now_unix: i64, window_secs: i64) -> Result<Vec<RecentSample>> {
        let since = now_unix.saturating_sub(window_secs);
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                r#"
                SELECT timestamp_unix,
                       input_tokens + output_tokens + cache_read_tokens + cache_creation_tokens
                FROM token_events
                WHERE timestamp_unix >= ?1 AND timestamp_unix <= ?2
                ORDER BY timestamp_unix ASC, id ASC
                "#,
            )?;
            let rows = stmt.query_map(params![since, now_unix], |row| {
                Ok(RecentSample {
                    timestamp_unix: row.get(0)?,
                    tokens: from_sql_count(row.get(1)?),
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }
}
