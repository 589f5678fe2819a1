#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokentop_core::{TokenCounts, TokenEvent};
use tokentop_db::{Db, RetryPolicy};

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("cache").join("metrics.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

/// A second handle on the same file, as another process would open it.
pub fn open_second(path: &PathBuf, retry: RetryPolicy) -> Db {
    let mut db = Db::open_with(path, retry).expect("open second handle");
    db.migrate().expect("migrate second handle");
    db
}

pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(2),
        max_delay: Duration::from_millis(8),
        timeout: Duration::from_millis(200),
        busy_timeout: Duration::from_millis(5),
    }
}

pub fn tokens(input: u64, output: u64) -> TokenCounts {
    TokenCounts {
        input_tokens: input,
        output_tokens: output,
        ..TokenCounts::default()
    }
}

pub fn make_event(
    source_file: &str,
    line_number: u64,
    timestamp_unix: i64,
    model: &str,
    tokens: TokenCounts,
) -> TokenEvent {
    TokenEvent {
        timestamp: format!("unix:{timestamp_unix}"),
        timestamp_unix,
        model: model.to_string(),
        tokens,
        source_file: source_file.to_string(),
        line_number,
    }
}
