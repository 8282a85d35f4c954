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

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_name` or `user_agent` is empty
    /// - `origin` is not an absolute http(s) URL
    /// - `api_prefix` does not start with `/`
    /// - `static_extensions` is empty or an entry contains a dot
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(invalid("cache_name", "must not be empty"));
        }

        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") => {}
            Ok(_) => return Err(invalid("origin", "scheme must be http or https")),
            Err(e) => return Err(invalid("origin", &e.to_string())),
        }

        if !self.api_prefix.starts_with('/') {
            return Err(invalid("api_prefix", "must start with '/'"));
        }

        if self.static_extensions.is_empty() {
            return Err(invalid("static_extensions", "must not be empty"));
        }
        if self.static_extensions.iter().any(|ext| ext.is_empty() || ext.contains('.')) {
            return Err(invalid("static_extensions", "entries must be bare extensions like \"css\""));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.precache_urls.is_empty() {
            tracing::warn!("precache_urls is empty; install will not store any critical assets");
        }

        Ok(())
    }
}
