use rusqlite::{Connection, OptionalExtension, params};
use tokentop_core::{ModelBreakdown, ModelTotals, merge_breakdowns};

use crate::Db;
use crate::error::Result;
use crate::helpers::{
    AGGREGATE_COLUMNS, from_sql_count, row_to_aggregate_row, row_to_token_counts, to_sql_count,
};
use crate::types::FileAggregate;

fn load_aggregate(conn: &Connection, source_file: &str) -> Result<Option<FileAggregate>> {
    let sql = format!("SELECT {AGGREGATE_COLUMNS} FROM file_aggregates WHERE source_file = ?1");
    let row = conn
        .query_row(&sql, params![source_file], row_to_aggregate_row)
        .optional()?;
    match row {
        Some(row) => Ok(Some(row.decode()?)),
        None => Ok(None),
    }
}

/// Sums the live events of one file in a single pass grouped by model.
fn summarize_events(conn: &Connection, source_file: &str) -> Result<FileAggregate> {
    let mut stmt = conn.prepare(
        r#"
        SELECT model,
               SUM(input_tokens), SUM(output_tokens),
               SUM(cache_read_tokens), SUM(cache_creation_tokens),
               COUNT(*), MIN(timestamp_unix), MAX(timestamp_unix)
        FROM token_events
        WHERE source_file = ?1
        GROUP BY model
        "#,
    )?;
    let mut rows = stmt.query(params![source_file])?;
    let mut summary = FileAggregate {
        source_file: source_file.to_string(),
        is_complete: false,
        completed_at: None,
        totals: Default::default(),
        event_count: 0,
        earliest_unix: None,
        latest_unix: None,
        models: ModelBreakdown::new(),
    };
    while let Some(row) = rows.next()? {
        let model: String = row.get(0)?;
        let totals = ModelTotals {
            tokens: row_to_token_counts(row, 1)?,
            event_count: from_sql_count(row.get(5)?),
        };
        let earliest: Option<i64> = row.get(6)?;
        let latest: Option<i64> = row.get(7)?;
        summary.totals.add(totals.tokens);
        summary.event_count += totals.event_count;
        summary.earliest_unix = min_opt(summary.earliest_unix, earliest);
        summary.latest_unix = max_opt(summary.latest_unix, latest);
        summary.models.entry(model).or_default().add(totals);
    }
    Ok(summary)
}

fn min_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

impl Db {
    pub fn get_file_aggregate(&self, source_file: &str) -> Result<Option<FileAggregate>> {
        self.read(|conn| load_aggregate(conn, source_file))
    }

    pub fn list_file_aggregates(&self) -> Result<Vec<FileAggregate>> {
        self.read(|conn| {
            let sql = format!("SELECT {AGGREGATE_COLUMNS} FROM file_aggregates ORDER BY source_file");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], row_to_aggregate_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let mut aggregates = Vec::with_capacity(rows.len());
            for row in rows {
                aggregates.push(row.decode()?);
            }
            Ok(aggregates)
        })
    }

    /// Compacts a finished file into one aggregate row and deletes its raw
    /// events.
    ///
    /// An existing row left behind by [`Db::mark_active`] acts as a floor:
    /// its totals are merged with the events ingested since reactivation.
    pub fn mark_complete(&mut self, source_file: &str, now_unix: i64) -> Result<FileAggregate> {
        let aggregate = self.write(|tx| {
            let live = summarize_events(tx, source_file)?;
            let floor = load_aggregate(tx, source_file)?;
            if let Some(existing) = floor.as_ref()
                && existing.is_complete
                && live.event_count == 0
            {
                return Ok(existing.clone());
            }

            let mut merged = live;
            if let Some(floor) = floor {
                merged.totals.add(floor.totals);
                merged.event_count += floor.event_count;
                merged.earliest_unix = min_opt(merged.earliest_unix, floor.earliest_unix);
                merged.latest_unix = max_opt(merged.latest_unix, floor.latest_unix);
                merge_breakdowns(&mut merged.models, &floor.models);
            }
            merged.is_complete = true;
            merged.completed_at = Some(now_unix);

            let breakdown = serde_json::to_string(&merged.models)?;
            tx.execute(
                r#"
                INSERT INTO file_aggregates (
                  source_file, is_complete, completed_at, input_tokens, output_tokens,
                  cache_read_tokens, cache_creation_tokens, event_count, earliest_unix,
                  latest_unix, model_breakdown
                ) VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(source_file) DO UPDATE SET
                  is_complete = 1,
                  completed_at = excluded.completed_at,
                  input_tokens = excluded.input_tokens,
                  output_tokens = excluded.output_tokens,
                  cache_read_tokens = excluded.cache_read_tokens,
                  cache_creation_tokens = excluded.cache_creation_tokens,
                  event_count = excluded.event_count,
                  earliest_unix = excluded.earliest_unix,
                  latest_unix = excluded.latest_unix,
                  model_breakdown = excluded.model_breakdown
                "#,
                params![
                    source_file,
                    now_unix,
                    to_sql_count(merged.totals.input_tokens),
                    to_sql_count(merged.totals.output_tokens),
                    to_sql_count(merged.totals.cache_read_tokens),
                    to_sql_count(merged.totals.cache_creation_tokens),
                    to_sql_count(merged.event_count),
                    merged.earliest_unix,
                    merged.latest_unix,
                    breakdown,
                ],
            )?;
            tx.execute(
                "DELETE FROM token_events WHERE source_file = ?1",
                params![source_file],
            )?;
            Ok(merged)
        })?;
        tracing::info!(
            file = %source_file,
            events = aggregate.event_count,
            "file compacted"
        );
        Ok(aggregate)
    }

    /// Clears the completion flag. The row's totals stay in place as a floor
    /// for window queries; deleted raw events are not restored.
    pub fn mark_active(&mut self, source_file: &str) -> Result<bool> {
        let changed = self.write(|tx| {
            Ok(tx.execute(
                r#"
                UPDATE file_aggregates
                SET is_complete = 0, completed_at = NULL
                WHERE source_file = ?1 AND is_complete = 1
                "#,
                params![source_file],
            )?)
        })?;
        if changed > 0 {
            tracing::info!(file = %source_file, "file reactivated");
        }
        Ok(changed > 0)
    }

    pub fn is_file_complete(&self, source_file: &str) -> Result<bool> {
        self.read(|conn| {
            let complete: Option<i64> = conn
                .query_row(
                    "SELECT is_complete FROM file_aggregates WHERE source_file = ?1",
                    params![source_file],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(complete.unwrap_or(0) != 0)
        })
    }
}
