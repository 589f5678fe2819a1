use std::time::Duration;

use rusqlite::ErrorCode;

/// Message fragments SQLite uses for lock conflicts when no extended code
/// is attached to the error.
const CONTENTION_SIGNATURES: &[&str] = &[
    "database is locked",
    "database table is locked",
    "database is busy",
    "sqlite_busy",
];

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("model breakdown encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage still locked after {attempts} attempts in {elapsed:?}")]
    Timeout { attempts: u32, elapsed: Duration },
}

impl DbError {
    /// True for transient lock errors that are worth retrying.
    pub fn is_contention(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, message)) => {
                matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
                    || message.as_deref().is_some_and(has_contention_signature)
            }
            Self::Sqlite(err) => has_contention_signature(&err.to_string()),
            _ => false,
        }
    }
}

fn has_contention_signature(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    CONTENTION_SIGNATURES
        .iter()
        .any(|signature| lower.contains(signature))
}

pub type Result<T> = std::result::Result<T, DbError>;
