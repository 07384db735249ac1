//! Configuration
//!
//! Loaded in three layers: built-in defaults, an optional TOML file, then
//! environment variables.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | STATS_DEBUG | false | Debug-level logging |
//! | STATS_LOG_JSON | false | JSON log lines |
//! | STATS_STORE_DATA_DIR | ./channel-stats-db | fjall keyspace directory |
//! | STATS_FAN_OUT_WORKERS | 5 | Concurrent hour-bucket scans per query |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StatsError};
use crate::store::{DEFAULT_FAN_OUT_WORKERS, DEFAULT_RESULT_BUFFER};
use crate::time_range::{DEFAULT_LOOKBACK_HOURS, MAX_LOOKBACK_HOURS};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatsConfig {
    /// Enable debug output
    pub debug: bool,
    /// Emit logs as JSON lines
    pub log_json: bool,
    pub store: StoreConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding the keyspace
    pub data_dir: PathBuf,
    /// Fsync the journal before acknowledging each increment
    pub sync_writes: bool,
    /// Number of locks serializing same-key increments
    pub lock_stripes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Hour buckets scanned concurrently per query
    pub fan_out_workers: usize,
    /// Capacity of the channel collecting scan results
    pub result_buffer: usize,
    /// Window length when a query gives no start hour
    pub default_lookback_hours: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: PathBuf::from("./channel-stats-db"),
            sync_writes: true,
            lock_stripes: 64,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            fan_out_workers: DEFAULT_FAN_OUT_WORKERS,
            result_buffer: DEFAULT_RESULT_BUFFER,
            default_lookback_hours: DEFAULT_LOOKBACK_HOURS,
        }
    }
}

impl StatsConfig {
    /// Defaults, then `path` (if any), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => StatsConfig::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StatsError::Config(format!("while reading config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
            .map_err(|e| StatsError::Config(format!("in config file '{}': {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| StatsError::Config(e.to_string()))
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("STATS_DEBUG") {
            self.debug = parse_flag(&v);
        }
        if let Some(v) = lookup("STATS_LOG_JSON") {
            self.log_json = parse_flag(&v);
        }
        if let Some(v) = lookup("STATS_STORE_DATA_DIR").filter(|v| !v.is_empty()) {
            self.store.data_dir = PathBuf::from(v);
        }
        if let Some(workers) = lookup("STATS_FAN_OUT_WORKERS").and_then(|v| v.parse().ok()) {
            self.query.fan_out_workers = workers;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.fan_out_workers == 0 {
            return Err(StatsError::Config("query.fan_out_workers must be at least 1".into()));
        }
        if self.query.result_buffer == 0 {
            return Err(StatsError::Config("query.result_buffer must be at least 1".into()));
        }
        if self.query.default_lookback_hours <= 0 {
            return Err(StatsError::Config(
                "query.default_lookback_hours must be positive".into(),
            ));
        }
        if self.query.default_lookback_hours > MAX_LOOKBACK_HOURS {
            return Err(StatsError::Config(format!(
                "query.default_lookback_hours must be at most {MAX_LOOKBACK_HOURS}"
            )));
        }
        if self.store.lock_stripes == 0 {
            return Err(StatsError::Config("store.lock_stripes must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = StatsConfig::default();
        assert_eq!(config.query.fan_out_workers, 5);
        assert_eq!(config.query.default_lookback_hours, 168);
        assert!(config.store.sync_writes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = StatsConfig::from_toml(
            r#"
            debug = true

            [store]
            data_dir = "/var/lib/channel-stats"

            [query]
            fan_out_workers = 8
            "#,
        )
        .unwrap();
        assert!(config.debug);
        assert_eq!(config.store.data_dir, PathBuf::from("/var/lib/channel-stats"));
        assert_eq!(config.store.lock_stripes, 64);
        assert_eq!(config.query.fan_out_workers, 8);
        assert_eq!(config.query.result_buffer, 5);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = StatsConfig::from_toml("[store]\ndatadir = \"x\"\n").unwrap_err();
        assert!(matches!(err, StatsError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STATS_DEBUG", "yes"),
            ("STATS_STORE_DATA_DIR", "/tmp/stats"),
            ("STATS_FAN_OUT_WORKERS", "3"),
        ]
        .into_iter()
        .collect();
        let mut config = StatsConfig::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));
        assert!(config.debug);
        assert!(!config.log_json);
        assert_eq!(config.store.data_dir, PathBuf::from("/tmp/stats"));
        assert_eq!(config.query.fan_out_workers, 3);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = StatsConfig::default();
        config.query.fan_out_workers = 0;
        assert!(matches!(config.validate(), Err(StatsError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unbounded_lookback() {
        let mut config = StatsConfig::default();
        config.query.default_lookback_hours = 10_000_000_000;
        assert!(matches!(config.validate(), Err(StatsError::Config(_))));

        config.query.default_lookback_hours = MAX_LOOKBACK_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.toml");
        std::fs::write(&path, "[query]\nresult_buffer = 16\n").unwrap();
        let config = StatsConfig::from_file(&path).unwrap();
        assert_eq!(config.query.result_buffer, 16);

        let missing = StatsConfig::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(StatsError::Config(_))));
    }
}
