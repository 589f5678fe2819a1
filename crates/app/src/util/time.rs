use chrono::{DateTime, Duration, SecondsFormat, Utc};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Formats epoch seconds the way snapshots expose timestamps.
pub fn unix_to_rfc3339(unix: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(unix, 0)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Start of the lookback window ending at `now`. Zero hours means "since
/// the epoch".
pub fn lookback_since(now: DateTime<Utc>, lookback_hours: u64) -> DateTime<Utc> {
    if lookback_hours == 0 {
        return DateTime::<Utc>::UNIX_EPOCH;
    }
    i64::try_from(lookback_hours)
        .ok()
        .and_then(Duration::try_hours)
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .max(DateTime::<Utc>::UNIX_EPOCH)
}
