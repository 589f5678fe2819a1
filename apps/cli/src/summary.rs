use tokentop_core::UsageSnapshot;
use tokentop_db::StoreStats;

fn role(snapshot: &UsageSnapshot) -> &'static str {
    match (snapshot.is_leader, snapshot.from_cache) {
        (true, _) => "leader",
        (false, true) => "cached",
        (false, false) => "follower",
    }
}

/// One status line per tick for the watch loop.
pub fn one_line(snapshot: &UsageSnapshot) -> String {
    if !snapshot.available {
        return format!(
            "{} unavailable: {}",
            snapshot.collected_at,
            snapshot.error.as_deref().unwrap_or("unknown error")
        );
    }
    let mut line = format!(
        "{} tokens {} (in {} out {} cache r {} w {}) ${:.4} {:.0} tok/min (avg {:.0}) [{}]",
        snapshot.collected_at,
        snapshot.total_tokens,
        snapshot.input_tokens,
        snapshot.output_tokens,
        snapshot.cache_read_tokens,
        snapshot.cache_creation_tokens,
        snapshot.total_cost_usd,
        snapshot.tokens_per_minute,
        snapshot.session_tokens_per_minute,
        role(snapshot),
    );
    if let Some(error) = snapshot.error.as_deref() {
        line.push_str(" warning: ");
        line.push_str(error);
    }
    line
}

pub fn store_stats(stats: &StoreStats) -> String {
    format!(
        "events {} bookmarks {} aggregates {} ({} complete) cached metrics {}",
        stats.token_events,
        stats.file_states,
        stats.file_aggregates,
        stats.complete_aggregates,
        stats.metrics_cache_entries
    )
}
