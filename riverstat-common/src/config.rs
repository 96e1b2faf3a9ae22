//! Bootstrap configuration loading
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (applied by the binary)
//! 2. TOML configuration file
//! 3. Built-in defaults (code constants)
//!
//! Config file resolution order:
//! 1. Explicit path (`--config`)
//! 2. `RIVERSTAT_CONFIG` environment variable
//! 3. `~/.config/riverstat/riverstat.toml`
//! 4. `/etc/riverstat/riverstat.toml`
//!
//! A missing config file never prevents startup: defaults are used and a
//! warning is logged. A file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "RIVERSTAT_CONFIG";

const CONFIG_FILE_NAME: &str = "riverstat.toml";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Interface the HTTP server binds to
    pub host: String,

    /// HTTP server port
    pub port: u16,

    /// SQLite database file; the in-memory store is used when absent
    pub database_path: Option<PathBuf>,

    pub logging: LoggingConfig,
    pub ingest: IngestConfig,
    pub series: SeriesConfig,
    pub retention: RetentionConfig,
    pub events: EventsConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5780,
            database_path: None,
            logging: LoggingConfig::default(),
            ingest: IngestConfig::default(),
            series: SeriesConfig::default(),
            retention: RetentionConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Ingest batch and fold retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Overall deadline for one ingest batch
    pub batch_timeout_ms: u64,
    /// Attempts per component fold (first try included)
    pub max_attempts: u32,
    /// Initial backoff between attempts; doubles up to 1 s
    pub retry_backoff_ms: u64,
    /// Longest wait for a per-key lock before reporting contention
    pub lock_timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_timeout_ms: 10_000,
            max_attempts: 3,
            retry_backoff_ms: 25,
            lock_timeout_ms: 2_000,
        }
    }
}

impl IngestConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Upper bound for `series.max_points`
pub const MAX_SERIES_POINTS: usize = 100_000;

/// Time-series query limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Largest number of points a single series request may return
    pub max_points: usize,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self { max_points: 1440 }
    }
}

/// Bucket retention sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub minute_retention_hours: u64,
    pub hour_retention_days: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            minute_retention_hours: 48,
            hour_retention_days: 90,
            sweep_interval_secs: 300,
        }
    }
}

impl RetentionConfig {
    pub fn minute_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.minute_retention_hours as i64)
    }

    pub fn hour_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.hour_retention_days as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Event broadcast settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events buffered per subscriber before the oldest are dropped
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

impl TomlConfig {
    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ingest.max_attempts == 0 {
            return Err(Error::Config("ingest.max_attempts must be at least 1".to_string()));
        }
        if self.ingest.batch_timeout_ms == 0 {
            return Err(Error::Config("ingest.batch_timeout_ms must be positive".to_string()));
        }
        if self.series.max_points == 0 || self.series.max_points > MAX_SERIES_POINTS {
            return Err(Error::Config(format!(
                "series.max_points must be between 1 and {}",
                MAX_SERIES_POINTS
            )));
        }
        if self.events.channel_capacity == 0 {
            return Err(Error::Config("events.channel_capacity must be at least 1".to_string()));
        }
        if self.retention.enabled && self.retention.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "retention.sweep_interval_secs must be positive when retention is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Locate the config file
///
/// Returns `None` when no candidate exists; explicit and environment paths
/// are returned even if missing so the loader can warn about them.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("riverstat").join(CONFIG_FILE_NAME));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/riverstat").join(CONFIG_FILE_NAME);
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load and validate the TOML config, falling back to defaults when missing
pub fn load_config(path: Option<&Path>) -> Result<TomlConfig> {
    let config = match path {
        None => {
            info!("No config file found, using built-in defaults");
            TomlConfig::default()
        }
        Some(path) if !path.exists() => {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            TomlConfig::default()
        }
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let config: TomlConfig = toml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            info!("Loaded config from {}", path.display());
            config
        }
    };

    config.validate()?;
    Ok(config)
}
