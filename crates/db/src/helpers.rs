use chrono::{SecondsFormat, Utc};
use rusqlite::Row;
use tokentop_core::{ModelBreakdown, TokenCounts};

use crate::types::{FileAggregate, FileState, Lease};

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn from_sql_count(value: i64) -> u64 {
    value.max(0) as u64
}

/// Reads four token columns starting at `offset`.
pub(crate) fn row_to_token_counts(
    row: &Row<'_>,
    offset: usize,
) -> std::result::Result<TokenCounts, rusqlite::Error> {
    Ok(TokenCounts {
        input_tokens: from_sql_count(row.get::<_, Option<i64>>(offset)?.unwrap_or(0)),
        output_tokens: from_sql_count(row.get::<_, Option<i64>>(offset + 1)?.unwrap_or(0)),
        cache_read_tokens: from_sql_count(row.get::<_, Option<i64>>(offset + 2)?.unwrap_or(0)),
        cache_creation_tokens: from_sql_count(
            row.get::<_, Option<i64>>(offset + 3)?.unwrap_or(0),
        ),
    })
}

pub(crate) fn row_to_file_state(row: &Row<'_>) -> std::result::Result<FileState, rusqlite::Error> {
    Ok(FileState {
        source_file: row.get(0)?,
        last_line: from_sql_count(row.get(1)?),
        mtime_ns: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

pub(crate) fn row_to_lease(row: &Row<'_>) -> std::result::Result<Lease, rusqlite::Error> {
    Ok(Lease {
        holder_id: row.get(0)?,
        acquired_at_ms: row.get(1)?,
        expires_at_ms: row.get(2)?,
    })
}

/// Raw aggregate row; the breakdown JSON is decoded separately so a bad
/// blob surfaces as a [`crate::DbError::Json`].
pub(crate) struct AggregateRow {
    pub source_file: String,
    pub is_complete: bool,
    pub completed_at: Option<i64>,
    pub totals: TokenCounts,
    pub event_count: u64,
    pub earliest_unix: Option<i64>,
    pub latest_unix: Option<i64>,
    pub model_breakdown: String,
}

pub(crate) const AGGREGATE_COLUMNS: &str = r#"
    source_file, is_complete, completed_at, input_tokens, output_tokens,
    cache_read_tokens, cache_creation_tokens, event_count, earliest_unix,
    latest_unix, model_breakdown
"#;

pub(crate) fn row_to_aggregate_row(
    row: &Row<'_>,
) -> std::result::Result<AggregateRow, rusqlite::Error> {
    Ok(AggregateRow {
        source_file: row.get(0)?,
        is_complete: row.get::<_, i64>(1)? != 0,
        completed_at: row.get(2)?,
        totals: row_to_token_counts(row, 3)?,
        event_count: from_sql_count(row.get(7)?),
        earliest_unix: row.get(8)?,
        latest_unix: row.get(9)?,
        model_breakdown: row.get(10)?,
    })
}

impl AggregateRow {
    pub(crate) fn decode(self) -> Result<FileAggregate, serde_json::Error> {
        let models: ModelBreakdown = serde_json::from_str(&self.model_breakdown)?;
        Ok(FileAggregate {
            source_file: self.source_file,
            is_complete: self.is_complete,
            completed_at: self.completed_at,
            totals: self.totals,
            event_count: self.event_count,
            earliest_unix: self.earliest_unix,
            latest_unix: self.latest_unix,
            models,
        })
    }
}
