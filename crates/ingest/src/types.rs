use serde::Serialize;
use std::io;

/// What happened to one file during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Modification time has not advanced past the bookmark.
    Unchanged,
    /// The file disappeared before or during the scan.
    Missing,
    Ingested,
    /// The file shrank below its bookmark and was reprocessed from line 0.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub file_path: String,
    pub status: FileStatus,
    pub lines_scanned: u64,
    pub events_inserted: usize,
}

impl FileOutcome {
    pub(crate) fn skipped(file_path: String, status: FileStatus) -> Self {
        Self {
            file_path,
            status,
            lines_scanned: 0,
            events_inserted: 0,
        }
    }
}

/// Ingest summary for a multi-file sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub files_total: usize,
    pub files_ingested: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub events_inserted: usize,
    pub lines_scanned: u64,
    pub issues: Vec<IngestIssue>,
}

impl IngestStats {
    pub fn has_failures(&self) -> bool {
        self.files_failed > 0
    }
}

/// A file that could not be ingested; the sweep carries on without it.
#[derive(Debug, Clone, Serialize)]
pub struct IngestIssue {
    pub file_path: String,
    pub message: String,
}

/// Errors emitted by the ingest pipeline.
#[derive(Debug)]
pub enum IngestError {
    Io(io::Error),
    Db(tokentop_db::DbError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Db(err) => write!(f, "db error: {}", err),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Db(err) => Some(err),
        }
    }
}

impl From<io::Error> for IngestError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<tokentop_db::DbError> for IngestError {
    fn from(err: tokentop_db::DbError) -> Self {
        Self::Db(err)
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
