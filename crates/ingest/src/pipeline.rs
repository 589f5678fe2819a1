use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::{Instant, UNIX_EPOCH};

use chrono::Utc;
use serde::de::IgnoredAny;
use tokentop_core::TokenEvent;
use tokentop_db::{Db, FileState};

use crate::parser::parse_usage_line;
use crate::paths::discover_log_files;
use crate::types::{FileOutcome, FileStatus, IngestIssue, IngestStats, Result};

/// Events buffered before each batched insert.
pub const BATCH_SIZE: usize = 100;

fn mtime_ns(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn is_missing(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}

/// Counts lines the same way the scan does, so a file that shrank below its
/// bookmark is detected before anything is read.
fn count_lines(path: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    let mut lines = 0u64;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 || is_partial_tail(&buf) {
            break;
        }
        lines += 1;
    }
    Ok(lines)
}

/// A final line without a newline may still be mid-write. It is only
/// consumed once it parses as complete JSON.
fn is_partial_tail(buf: &[u8]) -> bool {
    !buf.ends_with(b"\n") && serde_json::from_slice::<IgnoredAny>(buf).is_err()
}

struct ScanResult {
    last_line: u64,
    lines_scanned: u64,
    events_inserted: usize,
}

fn scan_from(db: &mut Db, path: &Path, file_path: &str, start_line: u64) -> Result<ScanResult> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    let mut batch: Vec<TokenEvent> = Vec::with_capacity(BATCH_SIZE);
    let mut line_number = 0u64;
    let mut lines_scanned = 0u64;
    let mut events_inserted = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if is_partial_tail(&buf) {
            break;
        }
        line_number += 1;
        if line_number <= start_line {
            continue;
        }
        lines_scanned += 1;
        let Ok(line) = std::str::from_utf8(&buf) else {
            continue;
        };
        let Some(parsed) = parse_usage_line(line.trim_end_matches(['\n', '\r'])) else {
            continue;
        };
        batch.push(TokenEvent {
            timestamp: parsed.timestamp,
            timestamp_unix: parsed.timestamp_unix,
            model: parsed.model,
            tokens: parsed.tokens,
            source_file: file_path.to_string(),
            line_number,
        });
        if batch.len() >= BATCH_SIZE {
            events_inserted += db.insert_events(&batch)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        events_inserted += db.insert_events(&batch)?;
    }
    Ok(ScanResult {
        last_line: line_number.max(start_line),
        lines_scanned,
        events_inserted,
    })
}

/// Ingests one transcript from its bookmark forward.
///
/// A file that disappears is reported as [`FileStatus::Missing`] rather than
/// an error. A file with fewer lines than its bookmark is wiped from the
/// store and reprocessed from the start.
pub fn ingest_file(db: &mut Db, path: &Path) -> Result<FileOutcome> {
    let file_path = path.to_string_lossy().to_string();
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if is_missing(&err) => {
            return Ok(FileOutcome::skipped(file_path, FileStatus::Missing));
        }
        Err(err) => return Err(err.into()),
    };
    let mtime = mtime_ns(&metadata);
    let state = db.get_file_state(&file_path)?;
    if let Some(state) = state.as_ref()
        && mtime <= state.mtime_ns
    {
        return Ok(FileOutcome::skipped(file_path, FileStatus::Unchanged));
    }
    ingest_changed(db, path, file_path, mtime, state)
}

/// Scans a file already known to have changed. The file may still vanish
/// before it is opened.
fn ingest_changed(
    db: &mut Db,
    path: &Path,
    file_path: String,
    mtime: i64,
    state: Option<FileState>,
) -> Result<FileOutcome> {
    let total_lines = match count_lines(path) {
        Ok(lines) => lines,
        Err(err) if is_missing(&err) => {
            return Ok(FileOutcome::skipped(file_path, FileStatus::Missing));
        }
        Err(err) => return Err(err.into()),
    };
    let mut start_line = state.as_ref().map(|state| state.last_line).unwrap_or(0);
    let mut status = FileStatus::Ingested;
    if total_lines < start_line {
        tracing::info!(
            file = %file_path,
            bookmark = start_line,
            lines = total_lines,
            "file shrank below bookmark, reprocessing"
        );
        db.reset_file(&file_path)?;
        start_line = 0;
        status = FileStatus::Reset;
    }

    let scan = match scan_from(db, path, &file_path, start_line) {
        Ok(scan) => scan,
        Err(crate::IngestError::Io(err)) if is_missing(&err) => {
            return Ok(FileOutcome::skipped(file_path, FileStatus::Missing));
        }
        Err(err) => return Err(err),
    };

    if scan.lines_scanned > 0 && db.is_file_complete(&file_path)? {
        db.mark_active(&file_path)?;
    }
    db.set_file_state(&FileState {
        source_file: file_path.clone(),
        last_line: scan.last_line,
        mtime_ns: mtime,
        updated_at: Utc::now().timestamp(),
    })?;

    tracing::debug!(
        file = %file_path,
        lines = scan.lines_scanned,
        events = scan.events_inserted,
        "file ingested"
    );
    Ok(FileOutcome {
        file_path,
        status,
        lines_scanned: scan.lines_scanned,
        events_inserted: scan.events_inserted,
    })
}

/// Whether everything on disk for `state` has been read: the file is gone,
/// or its mtime is no newer than the bookmark's. A bookmark left stale by a
/// failed write reports `false` until a later scan catches up.
pub fn is_settled(state: &FileState) -> bool {
    match fs::metadata(&state.source_file) {
        Ok(metadata) => mtime_ns(&metadata) <= state.mtime_ns,
        Err(err) => is_missing(&err),
    }
}

/// Ingests every path in order. Per-file failures are recorded in
/// [`IngestStats::issues`] and never stop the remaining files.
pub fn ingest_files<P: AsRef<Path>>(db: &mut Db, paths: &[P]) -> IngestStats {
    let started = Instant::now();
    let mut stats = IngestStats {
        files_total: paths.len(),
        ..IngestStats::default()
    };
    for path in paths {
        let path = path.as_ref();
        match ingest_file(db, path) {
            Ok(outcome) => {
                match outcome.status {
                    FileStatus::Ingested | FileStatus::Reset => stats.files_ingested += 1,
                    FileStatus::Unchanged | FileStatus::Missing => stats.files_skipped += 1,
                }
                stats.events_inserted += outcome.events_inserted;
                stats.lines_scanned += outcome.lines_scanned;
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "ingest failed");
                stats.files_failed += 1;
                stats.issues.push(IngestIssue {
                    file_path: path.to_string_lossy().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }
    tracing::debug!(
        files = stats.files_total,
        ingested = stats.files_ingested,
        failed = stats.files_failed,
        events = stats.events_inserted,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "ingest sweep finished"
    );
    stats
}

pub fn ingest_projects_dir(db: &mut Db, root: &Path) -> IngestStats {
    let files = discover_log_files(root);
    ingest_files(db, &files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db(dir: &Path) -> Db {
        let mut db = Db::open(dir.join("metrics.sqlite")).expect("open db");
        db.migrate().expect("migrate");
        db
    }

    #[test]
    fn file_removed_after_stat_is_reported_missing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut db = open_db(dir.path());
        let path = dir.path().join("vanishing.jsonl");
        fs::write(&path, "{}\n").expect("write log");
        let mtime = mtime_ns(&fs::metadata(&path).expect("metadata"));
        fs::remove_file(&path).expect("remove");

        let file_path = path.to_string_lossy().to_string();
        let outcome = ingest_changed(&mut db, &path, file_path.clone(), mtime, None)
            .expect("missing is not an error");
        assert_eq!(outcome.status, FileStatus::Missing);
        assert_eq!(outcome.lines_scanned, 0);
        assert!(db.get_file_state(&file_path).expect("state").is_none());
    }

    #[test]
    fn settled_tracks_bookmark_against_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("log.jsonl");
        fs::write(&path, "{}\n").expect("write log");
        let mtime = mtime_ns(&fs::metadata(&path).expect("metadata"));
        let mut state = FileState {
            source_file: path.to_string_lossy().to_string(),
            last_line: 1,
            mtime_ns: mtime,
            updated_at: 0,
        };
        assert!(is_settled(&state));

        state.mtime_ns = mtime - 1;
        assert!(!is_settled(&state));

        fs::remove_file(&path).expect("remove");
        assert!(is_settled(&state));
    }
}
