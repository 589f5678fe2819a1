pub mod cache;
pub mod collector;
pub mod config;
pub mod error;
pub mod lease;
pub mod pricing;
pub mod rate;
pub mod util;

pub use cache::UsageCache;
pub use collector::{Collector, SNAPSHOT_METRIC};
pub use config::{CacheConfig, RetryConfig};
pub use error::{AppError, Result};
pub use lease::LeaseManager;
pub use pricing::{load_initial_pricing, load_pricing_rules, resolve_pricing_rules, write_pricing_rules};
pub use rate::{session_rate, trailing_rate};
pub use util::time::{lookback_since, now_ms, unix_to_rfc3339};
