use rusqlite::{OptionalExtension, params};

use crate::Db;
use crate::error::Result;
use crate::helpers::now_rfc3339;

const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_init", MIGRATION_0001)];

impl Db {
    /// Applies pending migrations. Safe to call from several processes at
    /// once: the immediate transaction serializes them and applied names
    /// are recorded.
    pub fn migrate(&mut self) -> Result<()> {
        let applied = self.write(|tx| {
            tx.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS schema_migration (
                  name TEXT PRIMARY KEY,
                  applied_at TEXT NOT NULL
                );
                "#,
            )?;
            let mut applied = 0usize;
            for (name, sql) in MIGRATIONS {
                let done: Option<String> = tx
                    .query_row(
                        "SELECT name FROM schema_migration WHERE name = ?1",
                        params![name],
                        |row| row.get(0),
                    )
                    .optional()?;
                if done.is_some() {
                    continue;
                }
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migration (name, applied_at) VALUES (?1, ?2)",
                    params![name, now_rfc3339()],
                )?;
                applied += 1;
            }
            Ok(applied)
        })?;
        if applied > 0 {
            tracing::debug!(applied, "schema migrations applied");
        }
        Ok(())
    }
}
