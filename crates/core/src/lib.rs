use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The four token categories reported by every usage record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
}

impl TokenCounts {
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_tokens)
            .saturating_add(self.cache_creation_tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn add(&mut self, other: TokenCounts) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(other.cache_creation_tokens);
    }
}

/// One usage record parsed from one transcript line.
///
/// `(source_file, line_number)` identifies the event; storing the same pair
/// twice is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub timestamp: String,
    pub timestamp_unix: i64,
    pub model: String,
    pub tokens: TokenCounts,
    pub source_file: String,
    pub line_number: u64,
}

/// Summed tokens plus the number of events that contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTotals {
    #[serde(flatten)]
    pub tokens: TokenCounts,
    pub event_count: u64,
}

impl ModelTotals {
    pub fn add(&mut self, other: ModelTotals) {
        self.tokens.add(other.tokens);
        self.event_count = self.event_count.saturating_add(other.event_count);
    }
}

/// Per-model totals keyed by model name.
pub type ModelBreakdown = BTreeMap<String, ModelTotals>;

/// Sums matching model keys of `other` into `into`.
pub fn merge_breakdowns(into: &mut ModelBreakdown, other: &ModelBreakdown) {
    for (model, totals) in other {
        into.entry(model.clone()).or_default().add(*totals);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRule {
    pub model_pattern: String,
    pub input_per_1m: f64,
    pub output_per_1m: f64,
    pub cache_read_per_1m: f64,
    pub cache_write_per_1m: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub cache_read_cost_usd: f64,
    pub cache_write_cost_usd: f64,
    pub total_cost_usd: f64,
}

/// Token and cost line for one model in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub tokens: TokenCounts,
    pub total_tokens: u64,
    pub event_count: u64,
    pub cost_usd: Option<f64>,
}

/// What the dashboard renders on each refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub models: Vec<ModelUsage>,
    pub earliest: Option<String>,
    pub latest: Option<String>,
    pub tokens_per_minute: f64,
    pub session_tokens_per_minute: f64,
    pub since: String,
    pub collected_at: String,
    pub is_leader: bool,
    pub from_cache: bool,
    pub files_ingested: usize,
    pub files_failed: usize,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UsageSnapshot {
    pub fn unavailable(since: String, collected_at: String, message: impl Into<String>) -> Self {
        Self {
            since,
            collected_at,
            available: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

pub fn model_matches_pattern(model: &str, pattern: &str) -> bool {
    let model = model.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return model == pattern;
    }
    let mut parts: Vec<&str> = pattern.split('*').collect();
    let Some(head) = parts.first().copied() else {
        return false;
    };
    let Some(mut remainder) = model.strip_prefix(head) else {
        return false;
    };
    let tail = parts.pop().unwrap_or_default();
    for part in parts.iter().skip(1).filter(|part| !part.is_empty()) {
        match remainder.find(part) {
            Some(index) => remainder = &remainder[index + part.len()..],
            None => return false,
        }
    }
    // The last segment is anchored to the end of the name.
    remainder.ends_with(tail)
}

/// Picks the matching rule with the longest pattern, so `claude-opus-4-1*`
/// wins over `claude-opus*`.
pub fn find_pricing_rule<'a>(rules: &'a [PricingRule], model: &str) -> Option<&'a PricingRule> {
    rules
        .iter()
        .filter(|rule| model_matches_pattern(model, &rule.model_pattern))
        .max_by_key(|rule| rule.model_pattern.trim_matches('*').len())
}

pub fn compute_cost_breakdown(tokens: TokenCounts, rule: &PricingRule) -> CostBreakdown {
    let per_million = |count: u64, rate: f64| (count as f64 / 1_000_000.0) * rate;
    let input_cost = per_million(tokens.input_tokens, rule.input_per_1m);
    let output_cost = per_million(tokens.output_tokens, rule.output_per_1m);
    let cache_read_cost = per_million(tokens.cache_read_tokens, rule.cache_read_per_1m);
    let cache_write_cost = per_million(tokens.cache_creation_tokens, rule.cache_write_per_1m);
    CostBreakdown {
        input_cost_usd: input_cost,
        output_cost_usd: output_cost,
        cache_read_cost_usd: cache_read_cost,
        cache_write_cost_usd: cache_write_cost,
        total_cost_usd: input_cost + output_cost + cache_read_cost + cache_write_cost,
    }
}

/// Cost for `model`, or `None` when no rule prices it.
pub fn compute_cost_usd(rules: &[PricingRule], model: &str, tokens: TokenCounts) -> Option<f64> {
    find_pricing_rule(rules, model).map(|rule| compute_cost_breakdown(tokens, rule).total_cost_usd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, input: f64) -> PricingRule {
        PricingRule {
            model_pattern: pattern.to_string(),
            input_per_1m: input,
            output_per_1m: 15.0,
            cache_read_per_1m: 0.3,
            cache_write_per_1m: 3.75,
        }
    }

    #[test]
    fn cost_breakdown_prices_each_category() {
        let tokens = TokenCounts {
            input_tokens: 1_000_000,
            output_tokens: 200_000,
            cache_read_tokens: 2_000_000,
            cache_creation_tokens: 400_000,
        };
        let cost = compute_cost_breakdown(tokens, &rule("*", 3.0));

        assert!((cost.input_cost_usd - 3.0).abs() < 1e-9);
        assert!((cost.output_cost_usd - 3.0).abs() < 1e-9);
        assert!((cost.cache_read_cost_usd - 0.6).abs() < 1e-9);
        assert!((cost.cache_write_cost_usd - 1.5).abs() < 1e-9);
        assert!((cost.total_cost_usd - 8.1).abs() < 1e-9);
    }

    #[test]
    fn most_specific_rule_wins() {
        let rules = vec![rule("claude-opus*", 15.0), rule("claude-opus-4-5*", 5.0)];
        let found = find_pricing_rule(&rules, "claude-opus-4-5-20251101").expect("rule");
        assert_eq!(found.input_per_1m, 5.0);
        let found = find_pricing_rule(&rules, "claude-opus-4-1-20250805").expect("rule");
        assert_eq!(found.input_per_1m, 15.0);
        assert!(find_pricing_rule(&rules, "gpt-5").is_none());
    }

    #[test]
    fn pattern_matching_handles_wildcards() {
        assert!(model_matches_pattern("claude-sonnet-4-5", "claude-sonnet*"));
        assert!(model_matches_pattern("Claude-Sonnet-4-5", "*sonnet*"));
        assert!(!model_matches_pattern("claude-haiku", "claude-sonnet*"));
        assert!(model_matches_pattern("exact", "exact"));
        assert!(!model_matches_pattern("exact-not", "exact"));
        assert!(model_matches_pattern("a-end-x-end", "a*end"));
        assert!(!model_matches_pattern("a-end-x", "a*end"));
        assert!(model_matches_pattern("claude-3-5-sonnet-latest", "claude-*-sonnet*"));
        assert!(!model_matches_pattern("ab", "ab*b"));
    }

    #[test]
    fn merge_breakdowns_sums_matching_keys() {
        let mut left = ModelBreakdown::new();
        left.insert(
            "a".to_string(),
            ModelTotals {
                tokens: TokenCounts {
                    input_tokens: 10,
                    ..TokenCounts::default()
                },
                event_count: 1,
            },
        );
        let mut right = ModelBreakdown::new();
        right.insert(
            "a".to_string(),
            ModelTotals {
                tokens: TokenCounts {
                    input_tokens: 5,
                    output_tokens: 2,
                    ..TokenCounts::default()
                },
                event_count: 2,
            },
        );
        right.insert("b".to_string(), ModelTotals::default());

        merge_breakdowns(&mut left, &right);

        assert_eq!(left.len(), 2);
        assert_eq!(left["a"].tokens.input_tokens, 15);
        assert_eq!(left["a"].tokens.output_tokens, 2);
        assert_eq!(left["a"].event_count, 3);
    }
}
