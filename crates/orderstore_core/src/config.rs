//! Store configuration loading.
//!
//! # Responsibility
//! - Deserialize `StoreConfig` from a JSON file.
//! - Fill defaults and reject unusable values early.
//!
//! # Invariants
//! - A config returned by `load_config`/`parse_config` has passed `validate`.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "can't read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "can't parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Absolute log directory; file logging is off when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: None,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "database.path cannot be empty".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads and validates a JSON config file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<StoreConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&raw)
}

/// Parses and validates config JSON text.
pub fn parse_config(raw: &str) -> ConfigResult<StoreConfig> {
    let config: StoreConfig = serde_json::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_level() -> String {
    default_log_level().to_string()
}

#[cfg(test)]
mod tests {
    use super::{load_config, parse_config, ConfigError};
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse_config(r#"{"database": {"path": "/tmp/orders.db"}}"#).unwrap();
        assert_eq!(config.database.path, Path::new("/tmp/orders.db"));
        assert_eq!(config.database.pool_size, 4);
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
        assert!(config.logging.dir.is_none());
        assert!(!config.logging.level.is_empty());
    }

    #[test]
    fn full_config_is_parsed() {
        let config = parse_config(
            r#"{
                "database": {"path": "orders.db", "pool_size": 8, "busy_timeout_ms": 250},
                "logging": {"level": "warn", "dir": "/var/log/orderstore"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.database.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.logging.level, "warn");
        assert_eq!(
            config.logging.dir.as_deref(),
            Some(Path::new("/var/log/orderstore"))
        );
    }

    #[test]
    fn zero_pool_size_is_invalid() {
        let err = parse_config(r#"{"database": {"path": "x.db", "pool_size": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn empty_path_is_invalid() {
        let err = parse_config(r#"{"database": {"path": ""}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = parse_config(r#"{"database": {"path": "x.db", "port": 80}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let err = load_config(&missing).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }
}
