use std::io::BufRead;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tokentop_core::{ModelBreakdown, ModelTotals, TokenCounts};

const ASSISTANT_TYPE: &str = "assistant";
const UNKNOWN_MODEL: &str = "unknown";

#[derive(Deserialize)]
struct TranscriptLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    timestamp: Option<String>,
    message: Option<TranscriptMessage>,
}

#[derive(Deserialize)]
struct TranscriptMessage {
    model: Option<String>,
    usage: Option<TranscriptUsage>,
}

#[derive(Deserialize)]
struct TranscriptUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
    cache_creation_input_tokens: Option<u64>,
    cache_creation: Option<CacheCreation>,
}

/// Per-window breakdown written by newer clients instead of (or next to)
/// `cache_creation_input_tokens`.
#[derive(Deserialize)]
struct CacheCreation {
    ephemeral_5m_input_tokens: Option<u64>,
    ephemeral_1h_input_tokens: Option<u64>,
}

/// Usage fields pulled out of one qualifying transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUsage {
    pub timestamp: String,
    pub timestamp_unix: i64,
    pub model: String,
    pub tokens: TokenCounts,
}

/// Cache-creation tokens in precedence order: the explicit total when it is
/// present and non-zero, otherwise the sum of the ephemeral sub-windows.
pub fn resolve_cache_creation_tokens(
    explicit: Option<u64>,
    ephemeral_5m: Option<u64>,
    ephemeral_1h: Option<u64>,
) -> u64 {
    match explicit {
        Some(total) if total > 0 => total,
        _ => ephemeral_5m
            .unwrap_or(0)
            .saturating_add(ephemeral_1h.unwrap_or(0)),
    }
}

fn parse_timestamp(raw: &str) -> Option<(String, i64)> {
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc);
    Some((
        parsed.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        parsed.timestamp(),
    ))
}

/// Parses one line. Returns `None` for malformed JSON, non-assistant
/// records, records without usage or output tokens, and unparseable
/// timestamps.
pub fn parse_usage_line(line: &str) -> Option<ParsedUsage> {
    let record: TranscriptLine = serde_json::from_str(line).ok()?;
    if record.line_type.as_deref() != Some(ASSISTANT_TYPE) {
        return None;
    }
    let message = record.message?;
    let usage = message.usage?;
    let output_tokens = usage.output_tokens.unwrap_or(0);
    if output_tokens == 0 {
        return None;
    }
    let (timestamp, timestamp_unix) = parse_timestamp(record.timestamp.as_deref()?)?;
    let (ephemeral_5m, ephemeral_1h) = match usage.cache_creation {
        Some(ref windows) => (
            windows.ephemeral_5m_input_tokens,
            windows.ephemeral_1h_input_tokens,
        ),
        None => (None, None),
    };
    let model = message
        .model
        .filter(|model| !model.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_MODEL.to_string());
    Some(ParsedUsage {
        timestamp,
        timestamp_unix,
        model,
        tokens: TokenCounts {
            input_tokens: usage.input_tokens.unwrap_or(0),
            output_tokens,
            cache_read_tokens: usage.cache_read_input_tokens.unwrap_or(0),
            cache_creation_tokens: resolve_cache_creation_tokens(
                usage.cache_creation_input_tokens,
                ephemeral_5m,
                ephemeral_1h,
            ),
        },
    })
}

/// Totals for a whole transcript, computed without touching the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderSummary {
    pub lines: u64,
    pub events: u64,
    pub totals: TokenCounts,
    pub models: ModelBreakdown,
}

pub fn summarize_reader<R: BufRead>(mut reader: R) -> std::io::Result<ReaderSummary> {
    let mut summary = ReaderSummary::default();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        summary.lines += 1;
        let Ok(line) = std::str::from_utf8(&buf) else {
            continue;
        };
        let Some(parsed) = parse_usage_line(line.trim_end_matches(['\n', '\r'])) else {
            continue;
        };
        summary.events += 1;
        summary.totals.add(parsed.tokens);
        summary
            .models
            .entry(parsed.model)
            .or_default()
            .add(ModelTotals {
                tokens: parsed.tokens,
                event_count: 1,
            });
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ASSISTANT: &str = r#"{"type":"assistant","timestamp":"2025-10-01T12:00:00.123456789Z","message":{"model":"claude-sonnet-4-5","usage":{"input_tokens":100,"output_tokens":50,"cache_read_input_tokens":7,"cache_creation_input_tokens":9}}}"#;

    #[test]
    fn parses_assistant_usage() {
        let parsed = parse_usage_line(ASSISTANT).expect("usage");
        assert_eq!(parsed.model, "claude-sonnet-4-5");
        assert_eq!(parsed.tokens.input_tokens, 100);
        assert_eq!(parsed.tokens.output_tokens, 50);
        assert_eq!(parsed.tokens.cache_read_tokens, 7);
        assert_eq!(parsed.tokens.cache_creation_tokens, 9);
        assert_eq!(parsed.timestamp_unix, 1_759_320_000);
        assert_eq!(parsed.timestamp, "2025-10-01T12:00:00.123456789Z");
    }

    #[test]
    fn cache_creation_falls_back_to_ephemeral_windows() {
        let line = r#"{"type":"assistant","timestamp":"2025-10-01T12:00:00Z","message":{"model":"m","usage":{"input_tokens":1,"output_tokens":1,"cache_creation_input_tokens":0,"cache_creation":{"ephemeral_5m_input_tokens":30,"ephemeral_1h_input_tokens":12}}}}"#;
        let parsed = parse_usage_line(line).expect("usage");
        assert_eq!(parsed.tokens.cache_creation_tokens, 42);
    }

    #[test]
    fn explicit_cache_creation_wins_when_non_zero() {
        assert_eq!(resolve_cache_creation_tokens(Some(5), Some(30), Some(12)), 5);
        assert_eq!(resolve_cache_creation_tokens(Some(0), Some(30), None), 30);
        assert_eq!(resolve_cache_creation_tokens(None, None, Some(12)), 12);
        assert_eq!(resolve_cache_creation_tokens(None, None, None), 0);
    }

    #[test]
    fn skips_non_qualifying_lines() {
        assert!(parse_usage_line("not json").is_none());
        assert!(parse_usage_line(r#"{"type":"user","timestamp":"2025-10-01T12:00:00Z"}"#).is_none());
        let zero_output = r#"{"type":"assistant","timestamp":"2025-10-01T12:00:00Z","message":{"model":"m","usage":{"input_tokens":5,"output_tokens":0}}}"#;
        assert!(parse_usage_line(zero_output).is_none());
        let bad_ts = r#"{"type":"assistant","timestamp":"yesterday","message":{"model":"m","usage":{"input_tokens":5,"output_tokens":3}}}"#;
        assert!(parse_usage_line(bad_ts).is_none());
        let no_usage = r#"{"type":"assistant","timestamp":"2025-10-01T12:00:00Z","message":{"model":"m"}}"#;
        assert!(parse_usage_line(no_usage).is_none());
    }

    #[test]
    fn missing_model_is_recorded_as_unknown() {
        let line = r#"{"type":"assistant","timestamp":"2025-10-01T12:00:00+02:00","message":{"usage":{"input_tokens":1,"output_tokens":2}}}"#;
        let parsed = parse_usage_line(line).expect("usage");
        assert_eq!(parsed.model, UNKNOWN_MODEL);
        assert_eq!(parsed.timestamp, "2025-10-01T10:00:00Z");
    }

    #[test]
    fn summarize_reader_counts_lines_and_models() {
        let data = format!("{ASSISTANT}\n{{\"type\":\"user\"}}\n{ASSISTANT}\n");
        let summary = summarize_reader(Cursor::new(data)).expect("summary");
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.totals.input_tokens, 200);
        assert_eq!(summary.models["claude-sonnet-4-5"].event_count, 2);
    }

    #[test]
    fn summarize_reader_skips_undecodable_lines() {
        let mut data = Vec::new();
        data.extend_from_slice(ASSISTANT.as_bytes());
        data.extend_from_slice(b"\n{\"type\":\"user\",\"text\":\"\xff\xfe\"}\n");
        data.extend_from_slice(ASSISTANT.as_bytes());
        let summary = summarize_reader(Cursor::new(data)).expect("summary");
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.totals.output_tokens, 100);
    }
}
