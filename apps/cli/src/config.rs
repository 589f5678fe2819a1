use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokentop_app::CacheConfig;

use crate::args::Cli;

const CONFIG_DIR_NAME: &str = "tokentop";
const CONFIG_FILE_NAME: &str = "tokentop.toml";

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: CacheConfig,
    pub file: PathBuf,
    pub created: bool,
}

/// Loads the config from `explicit`, or from the platform config dir,
/// writing a default file there on first run.
pub fn load_or_create(explicit: Option<&Path>) -> Result<ConfigLoad> {
    if let Some(path) = explicit {
        return Ok(ConfigLoad {
            config: read_config(path)?,
            file: path.to_path_buf(),
            created: false,
        });
    }

    let dir = config_dir()?;
    let file = dir.join(CONFIG_FILE_NAME);
    if file.exists() {
        return Ok(ConfigLoad {
            config: read_config(&file)?,
            file,
            created: false,
        });
    }

    fs::create_dir_all(&dir).with_context(|| format!("create config dir {}", dir.display()))?;
    let config = CacheConfig::default();
    let contents = toml::to_string_pretty(&config).context("serialize config")?;
    fs::write(&file, contents).with_context(|| format!("write config {}", file.display()))?;
    Ok(ConfigLoad {
        config,
        file,
        created: true,
    })
}

fn read_config(path: &Path) -> Result<CacheConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse config {}", path.display()))
}

fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("resolve platform config dir")?;
    Ok(base.join(CONFIG_DIR_NAME))
}

/// Command-line flags win over the file.
pub fn apply_overrides(config: &mut CacheConfig, cli: &Cli) {
    if let Some(dir) = cli.cache_dir.clone() {
        config.cache_dir = dir;
    }
    if let Some(dir) = cli.projects_dir.clone() {
        config.projects_dir = Some(dir);
    }
    if let Some(hours) = cli.lookback_hours {
        config.lookback_hours = hours;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn explicit_file_is_read_with_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tokentop.toml");
        fs::write(
            &path,
            "lookback_hours = 6\ncompaction_quiet_period_secs = 60\n\n[retry]\ntimeout_ms = 1000\n",
        )
        .expect("write config");

        let load = load_or_create(Some(&path)).expect("load");
        assert!(!load.created);
        assert_eq!(load.config.lookback_hours, 6);
        assert_eq!(load.config.compaction_quiet_period_secs, Some(60));
        assert_eq!(load.config.retry.timeout_ms, 1000);
        assert_eq!(load.config.retry.max_attempts, 5);
        assert_eq!(load.config.rate_window_secs, 60);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let contents = toml::to_string_pretty(&CacheConfig::default()).expect("serialize");
        let parsed: CacheConfig = toml::from_str(&contents).expect("parse");
        assert_eq!(parsed, CacheConfig::default());
    }

    #[test]
    fn flags_override_file_values() {
        let mut config = CacheConfig::default();
        let cli = Cli::parse_from([
            "tokentop",
            "--cache-dir",
            "/tmp/tt",
            "--projects-dir",
            "/tmp/projects",
            "--lookback-hours",
            "0",
        ]);
        apply_overrides(&mut config, &cli);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/tt"));
        assert_eq!(config.projects_dir, Some(PathBuf::from("/tmp/projects")));
        assert_eq!(config.lookback_hours, 0);
    }
}
