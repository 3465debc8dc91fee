//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (DOCSHELF_*)
//! 2. TOML config file (if DOCSHELF_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (DOCSHELF_*)
/// 2. TOML config file (if DOCSHELF_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite document store.
    ///
    /// Set via DOCSHELF_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// How long a crawl lease stays valid without being released.
    ///
    /// Set via DOCSHELF_LEASE_TTL_SECS environment variable.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    /// Retries for a single page upsert that hit a transient store error.
    ///
    /// Set via DOCSHELF_UPSERT_MAX_RETRIES environment variable.
    #[serde(default = "default_upsert_max_retries")]
    pub upsert_max_retries: u32,

    /// Base delay for exponential retry backoff, in milliseconds.
    ///
    /// Set via DOCSHELF_RETRY_BACKOFF_MS environment variable.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Total attempts made to activate a finished crawl.
    ///
    /// Set via DOCSHELF_ACTIVATE_MAX_ATTEMPTS environment variable.
    #[serde(default = "default_activate_max_attempts")]
    pub activate_max_attempts: u32,

    /// Result count used when a search does not specify a limit.
    ///
    /// Set via DOCSHELF_SEARCH_DEFAULT_LIMIT environment variable.
    #[serde(default = "default_search_default_limit")]
    pub search_default_limit: usize,

    /// Upper bound applied to any requested search limit.
    ///
    /// Set via DOCSHELF_SEARCH_MAX_LIMIT environment variable.
    #[serde(default = "default_search_max_limit")]
    pub search_max_limit: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./docshelf.sqlite")
}

fn default_lease_ttl_secs() -> u64 {
    3_600
}

fn default_upsert_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_activate_max_attempts() -> u32 {
    3
}

fn default_search_default_limit() -> usize {
    10
}

fn default_search_max_limit() -> usize {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            lease_ttl_secs: default_lease_ttl_secs(),
            upsert_max_retries: default_upsert_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            activate_max_attempts: default_activate_max_attempts(),
            search_default_limit: default_search_default_limit(),
            search_max_limit: default_search_max_limit(),
        }
    }
}

impl AppConfig {
    /// Lease TTL as Duration.
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    /// Base retry backoff as Duration.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Resolve a caller-supplied search limit against the configured bounds.
    pub fn search_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.search_default_limit)
            .min(self.search_max_limit)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `DOCSHELF_`
    /// 2. TOML file from `DOCSHELF_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("DOCSHELF_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("DOCSHELF_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./docshelf.sqlite"));
        assert_eq!(config.lease_ttl_secs, 3_600);
        assert_eq!(config.upsert_max_retries, 3);
        assert_eq!(config.retry_backoff_ms, 250);
        assert_eq!(config.activate_max_attempts, 3);
        assert_eq!(config.search_default_limit, 10);
        assert_eq!(config.search_max_limit, 100);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.lease_ttl(), Duration::from_secs(3_600));
        assert_eq!(config.retry_backoff(), Duration::from_millis(250));
    }

    #[test]
    fn test_search_limit_resolution() {
        let config = AppConfig::default();
        assert_eq!(config.search_limit(None), 10);
        assert_eq!(config.search_limit(Some(5)), 5);
        assert_eq!(config.search_limit(Some(10_000)), 100);
    }
}
