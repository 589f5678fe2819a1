use tokentop_db::RecentSample;

const SECONDS_PER_MINUTE: f64 = 60.0;

/// Tokens per minute over the trailing window.
///
/// The denominator is the span between the oldest and newest sample, so a
/// burst at the end of a quiet window is not diluted by the idle part. With
/// fewer than two samples, or all samples in the same second, the full
/// window length is used instead.
pub fn trailing_rate(samples: &[RecentSample], window_secs: i64) -> f64 {
    let total: u64 = samples.iter().map(|sample| sample.tokens).sum();
    if total == 0 {
        return 0.0;
    }
    let span_secs = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => last.timestamp_unix - first.timestamp_unix,
        _ => 0,
    };
    let minutes = if span_secs > 0 {
        span_secs as f64 / SECONDS_PER_MINUTE
    } else {
        window_secs.max(1) as f64 / SECONDS_PER_MINUTE
    };
    total as f64 / minutes
}

/// Average tokens per minute between the first and last event of the
/// window. Zero when the window has no span.
pub fn session_rate(total_tokens: u64, earliest_unix: Option<i64>, latest_unix: Option<i64>) -> f64 {
    match (earliest_unix, latest_unix) {
        (Some(earliest), Some(latest)) if latest > earliest => {
            total_tokens as f64 / ((latest - earliest) as f64 / SECONDS_PER_MINUTE)
        }
        _ => 0.0,
    }
}
