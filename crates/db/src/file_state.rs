use rusqlite::{OptionalExtension, params};

use crate::Db;
use crate::error::Result;
use crate::helpers::{row_to_file_state, to_sql_count};
use crate::types::FileState;

impl Db {
    pub fn get_file_state(&self, source_file: &str) -> Result<Option<FileState>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    r#"
                    SELECT source_file, last_line, mtime_ns, updated_at
                    FROM file_state
                    WHERE source_file = ?1
                    "#,
                    params![source_file],
                    row_to_file_state,
                )
                .optional()?)
        })
    }

    pub fn set_file_state(&mut self, state: &FileState) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                r#"
                INSERT INTO file_state (source_file, last_line, mtime_ns, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(source_file) DO UPDATE SET
                  last_line = excluded.last_line,
                  mtime_ns = excluded.mtime_ns,
                  updated_at = excluded.updated_at
                "#,
                params![
                    state.source_file,
                    to_sql_count(state.last_line),
                    state.mtime_ns,
                    state.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn delete_file_state(&mut self, source_file: &str) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM file_state WHERE source_file = ?1",
                params![source_file],
            )?;
            Ok(())
        })
    }

    pub fn list_file_states(&self) -> Result<Vec<FileState>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT source_file, last_line, mtime_ns, updated_at
                FROM file_state
                ORDER BY source_file ASC
                "#,
            )?;
            let rows = stmt.query_map([], row_to_file_state)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    /// Bookmarks whose last observed mtime is older than `cutoff_ns` and
    /// that have no complete aggregate yet.
    pub fn list_idle_files(&self, cutoff_ns: i64) -> Result<Vec<FileState>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT fs.source_file, fs.last_line, fs.mtime_ns, fs.updated_at
                FROM file_state fs
                LEFT JOIN file_aggregates fa ON fa.source_file = fs.source_file
                WHERE fs.mtime_ns < ?1
                  AND COALESCE(fa.is_complete, 0) = 0
                ORDER BY fs.source_file ASC
                "#,
            )?;
            let rows = stmt.query_map(params![cutoff_ns], row_to_file_state)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }
}
