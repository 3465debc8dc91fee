//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `db_path` is empty
    /// - `lease_ttl_secs` is 0 or exceeds one day
    /// - `activate_max_attempts` is below 2
    /// - `retry_backoff_ms` exceeds one minute
    /// - search limits are 0 or the default exceeds the maximum
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "db_path".into(), reason: "must not be empty".into() });
        }

        if self.lease_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "lease_ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.lease_ttl_secs > 86_400 {
            return Err(ConfigError::Invalid {
                field: "lease_ttl_secs".into(),
                reason: "must not exceed one day (86400s)".into(),
            });
        }

        if self.activate_max_attempts < 2 {
            return Err(ConfigError::Invalid {
                field: "activate_max_attempts".into(),
                reason: "activation must be attempted at least twice".into(),
            });
        }

        if self.retry_backoff_ms > 60_000 {
            return Err(ConfigError::Invalid {
                field: "retry_backoff_ms".into(),
                reason: "must not exceed one minute (60000ms)".into(),
            });
        }

        if self.search_default_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "search_default_limit".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.search_default_limit > self.search_max_limit {
            return Err(ConfigError::Invalid {
                field: "search_default_limit".into(),
                reason: "must not exceed search_max_limit".into(),
            });
        }

        if self.upsert_max_retries == 0 {
            tracing::warn!("upsert_max_retries is 0; transient store errors will abort crawls immediately");
        }

        Ok(())
    }
}
