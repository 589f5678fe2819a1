use rusqlite::{Transaction, params};
use tokentop_core::TokenEvent;

use crate::Db;
use crate::error::Result;
use crate::helpers::{from_sql_count, to_sql_count};

const INSERT_EVENT: &str = r#"
    INSERT OR IGNORE INTO token_events (
      source_file, line_number, timestamp, timestamp_unix, model,
      input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens
    ) VALUES (
      ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
    )
"#;

fn insert_all(tx: &Transaction<'_>, events: &[TokenEvent]) -> Result<usize> {
    let mut stmt = tx.prepare_cached(INSERT_EVENT)?;
    let mut inserted = 0usize;
    for event in events {
        let rows = stmt.execute(params![
            event.source_file,
            to_sql_count(event.line_number),
            event.timestamp,
            event.timestamp_unix,
            event.model,
            to_sql_count(event.tokens.input_tokens),
            to_sql_count(event.tokens.output_tokens),
            to_sql_count(event.tokens.cache_read_tokens),
            to_sql_count(event.tokens.cache_creation_tokens),
        ])?;
        if rows > 0 {
            inserted += 1;
        }
    }
    Ok(inserted)
}

impl Db {
    /// Returns `false` when the `(source_file, line_number)` pair was
    /// already stored.
    pub fn insert_event(&mut self, event: &TokenEvent) -> Result<bool> {
        let inserted = self.insert_events(std::slice::from_ref(event))?;
        Ok(inserted > 0)
    }

    /// Inserts a batch in one transaction and returns how many rows were new.
    pub fn insert_events(&mut self, events: &[TokenEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        self.write(|tx| insert_all(tx, events))
    }

    pub fn count_events_for_file(&self, source_file: &str) -> Result<u64> {
        self.read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM token_events WHERE source_file = ?1",
                params![source_file],
                |row| row.get(0),
            )?;
            Ok(from_sql_count(count))
        })
    }

    /// Forgets everything known about a file: raw events, bookmark and any
    /// compacted aggregate. Used when a file was truncated or rewritten.
    pub fn reset_file(&mut self, source_file: &str) -> Result<usize> {
        let removed = self.write(|tx| {
            let removed = tx.execute(
                "DELETE FROM token_events WHERE source_file = ?1",
                params![source_file],
            )?;
            tx.execute(
                "DELETE FROM file_state WHERE source_file = ?1",
                params![source_file],
            )?;
            tx.execute(
                "DELETE FROM file_aggregates WHERE source_file = ?1",
                params![source_file],
            )?;
            Ok(removed)
        })?;
        tracing::info!(file = %source_file, removed, "file state reset");
        Ok(removed)
    }
}
