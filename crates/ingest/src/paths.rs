use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub fn default_projects_dir() -> PathBuf {
    if let Ok(path) = std::env::var("CLAUDE_CONFIG_DIR") {
        return PathBuf::from(path).join("projects");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".claude").join("projects");
    }
    PathBuf::from(".claude").join("projects")
}

fn is_transcript(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|value| value.to_str()),
        Some("jsonl")
    )
}

/// All `*.jsonl` transcripts under `root`, including nested subagent
/// directories, in path order. A missing root yields nothing.
pub fn discover_log_files(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable log entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_transcript(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files
}
