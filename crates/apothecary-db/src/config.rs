//! Engine configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::RetryPolicy;
use crate::pool::DbConfig;

/// Runtime configuration for the database and the sale engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    /// Connection pool size
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    pub connect_timeout_secs: u64,

    /// Attempts per unit of work on transient storage failures
    pub commit_max_attempts: u32,

    /// Linear backoff step between attempts, in milliseconds
    pub commit_backoff_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_path: PathBuf::from("apothecary.db"),
            max_connections: 5,
            connect_timeout_secs: 30,
            commit_max_attempts: 3,
            commit_backoff_ms: 25,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();

        let config = AppConfig {
            db_path: lookup("APOTHECARY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),

            max_connections: parse_or(&lookup, "APOTHECARY_DB_MAX_CONNECTIONS", defaults.max_connections)?,

            connect_timeout_secs: parse_or(
                &lookup,
                "APOTHECARY_DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            )?,

            commit_max_attempts: parse_or(
                &lookup,
                "APOTHECARY_COMMIT_MAX_ATTEMPTS",
                defaults.commit_max_attempts,
            )?,

            commit_backoff_ms: parse_or(&lookup, "APOTHECARY_COMMIT_BACKOFF_MS", defaults.commit_backoff_ms)?,
        };

        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue("APOTHECARY_DB_MAX_CONNECTIONS".to_string()));
        }
        if config.commit_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("APOTHECARY_COMMIT_MAX_ATTEMPTS".to_string()));
        }

        Ok(config)
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.db_path.clone())
            .max_connections(self.max_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.commit_max_attempts,
            backoff: Duration::from_millis(self.commit_backoff_ms),
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
