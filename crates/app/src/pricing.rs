use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{AppError, Result};
use tokentop_core::PricingRule;

pub fn load_initial_pricing() -> Result<Vec<PricingRule>> {
    let data = include_str!("../initial-pricing.json");
    serde_json::from_str(data).map_err(AppError::from)
}

pub fn load_pricing_rules(path: &Path) -> Result<Vec<PricingRule>> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(AppError::from)
}

/// Rules from `override_path` when it exists, otherwise the built-in table.
pub fn resolve_pricing_rules(override_path: Option<&Path>) -> Result<Vec<PricingRule>> {
    match override_path {
        Some(path) if path.exists() => load_pricing_rules(path),
        Some(path) => {
            tracing::warn!(path = %path.display(), "pricing file missing, using defaults");
            load_initial_pricing()
        }
        None => load_initial_pricing(),
    }
}

pub fn write_pricing_rules(path: &Path, rules: &[PricingRule]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, rules).map_err(AppError::from)
}
