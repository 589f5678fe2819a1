mod parser;
mod paths;
mod pipeline;
mod types;

pub use parser::{
    ParsedUsage, ReaderSummary, parse_usage_line, resolve_cache_creation_tokens,
    summarize_reader,
};
pub use paths::{default_projects_dir, discover_log_files};
pub use pipeline::{BATCH_SIZE, ingest_file, ingest_files, ingest_projects_dir, is_settled};
pub use types::{FileOutcome, FileStatus, IngestError, IngestIssue, IngestStats, Result};
