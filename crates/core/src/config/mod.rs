//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TECHTALKS_*)
//! 2. TOML config file (if TECHTALKS_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::Generation;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TECHTALKS_*)
/// 2. TOML config file (if TECHTALKS_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin the client is served from; relative paths resolve against it.
    ///
    /// Set via TECHTALKS_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to SQLite cache database.
    ///
    /// Set via TECHTALKS_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Name prefix of core cache generations.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Build date the core generation is named after. Defaults to today (UTC).
    #[serde(default)]
    pub build_date: Option<NaiveDate>,

    /// Same-origin paths pre-cached on install, in order.
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,

    /// Page served for uncached navigations while offline.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// File name of the versioner's own script, never rewritten.
    #[serde(default = "default_versioner_script")]
    pub versioner_script: String,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to read per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Fixed delay before a closed live channel reconnects.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Period of the resource versioner.
    #[serde(default = "default_versioner_interval_ms")]
    pub versioner_interval_ms: u64,

    /// Period of the worker update check.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Delay before retrying a message/news load that failed offline.
    #[serde(default = "default_load_retry_delay_ms")]
    pub load_retry_delay_ms: u64,

    /// Retry cap for offline loads. Unset retries forever.
    #[serde(default)]
    pub load_retry_limit: Option<u32>,

    /// Bearer token of an existing session.
    ///
    /// Set via TECHTALKS_TOKEN environment variable.
    #[serde(default)]
    pub token: Option<String>,

    /// Credentials for logging in when no token is set.
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_origin() -> String {
    "https://localhost".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./techtalks-cache.sqlite")
}

fn default_cache_prefix() -> String {
    "techtalks-v6".into()
}

fn default_assets() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/style.css",
        "/script.js",
        "/crypto.js",
        "/404.html",
        "/okak-cat.png",
        "/manifest.json",
        "/cache-control.js",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_offline_page() -> String {
    "/404.html".into()
}

fn default_versioner_script() -> String {
    "cache-control.js".into()
}

fn default_user_agent() -> String {
    "techtalks/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_versioner_interval_ms() -> u64 {
    300_000
}

fn default_update_interval_ms() -> u64 {
    3_600_000
}

fn default_load_retry_delay_ms() -> u64 {
    2_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            db_path: default_db_path(),
            cache_prefix: default_cache_prefix(),
            build_date: None,
            assets: default_assets(),
            offline_page: default_offline_page(),
            versioner_script: default_versioner_script(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            versioner_interval_ms: default_versioner_interval_ms(),
            update_interval_ms: default_update_interval_ms(),
            load_retry_delay_ms: default_load_retry_delay_ms(),
            load_retry_limit: None,
            token: None,
            username: None,
            password: None,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn versioner_interval(&self) -> Duration {
        Duration::from_millis(self.versioner_interval_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn load_retry_delay(&self) -> Duration {
        Duration::from_millis(self.load_retry_delay_ms)
    }

    /// Parsed origin URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme {scheme}") }),
        }
    }

    /// Core cache generation for the configured (or current) build date.
    pub fn generation(&self) -> Generation {
        match self.build_date {
            Some(date) => Generation::new(&self.cache_prefix, date),
            None => Generation::today(&self.cache_prefix),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TECHTALKS_`
    /// 2. TOML file from `TECHTALKS_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("TECHTALKS_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TECHTALKS_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Bearer token of the configured session.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no token is set.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "token".into(),
            hint: "Set TECHTALKS_TOKEN or TECHTALKS_USERNAME/TECHTALKS_PASSWORD".into(),
        })
    }
}
