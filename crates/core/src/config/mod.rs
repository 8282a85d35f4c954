//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CACHEWARDEN_*)
//! 2. TOML config file (if CACHEWARDEN_CONFIG_FILE set)
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
/// 1. Environment variables (CACHEWARDEN_*)
/// 2. TOML config file (if CACHEWARDEN_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the current cache generation.
    ///
    /// Changing it on redeploy is what evicts the previous generation at
    /// activation. Set via CACHEWARDEN_CACHE_NAME.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Path to SQLite cache database.
    ///
    /// Set via CACHEWARDEN_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin that relative request and precache paths resolve against.
    ///
    /// Set via CACHEWARDEN_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Critical paths stored during install.
    #[serde(default = "default_precache_urls")]
    pub precache_urls: Vec<String>,

    /// Path prefix routed to the network-first strategy.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// File extensions (without the dot) served cache-first.
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via CACHEWARDEN_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Largest response body stored in the cache. Larger responses are
    /// still served, just never cached.
    ///
    /// Set via CACHEWARDEN_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via CACHEWARDEN_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Fetches slower than this are logged as slow resources.
    #[serde(default = "default_slow_resource_ms")]
    pub slow_resource_ms: u64,
}

fn default_cache_name() -> String {
    "portfolio-v1".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./cachewarden.sqlite")
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_precache_urls() -> Vec<String> {
    ["/", "/manifest.json", "/images/profile.jpg", "/logo.svg"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_static_extensions() -> Vec<String> {
    ["css", "js", "png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico", "woff", "woff2"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_user_agent() -> String {
    "cachewarden/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_slow_resource_ms() -> u64 {
    1_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            db_path: default_db_path(),
            origin: default_origin(),
            precache_urls: default_precache_urls(),
            api_prefix: default_api_prefix(),
            static_extensions: default_static_extensions(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            slow_resource_ms: default_slow_resource_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Slow-resource threshold as Duration.
    pub fn slow_resource_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_resource_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CACHEWARDEN_`
    /// 2. TOML file from `CACHEWARDEN_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("CACHEWARDEN_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CACHEWARDEN_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
