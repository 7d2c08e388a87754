//! Configuration validation rules.
//!
//! Checks `AppConfig` values after they have been loaded from environment,
//! files, or defaults.

use crate::cache::{API_CACHE, NEWS_CACHE};
use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `cache_prefix` is empty or collides with an unversioned store
    /// - `assets` is empty, has a non-absolute path, or lacks `offline_page`
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - any interval or delay is 0
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin_url()?;

        if self.cache_prefix.trim().is_empty() {
            return Err(invalid("cache_prefix", "must not be empty"));
        }
        if self.cache_prefix == API_CACHE || self.cache_prefix == NEWS_CACHE {
            return Err(invalid("cache_prefix", "must not name an unversioned store"));
        }

        if self.assets.is_empty() {
            return Err(invalid("assets", "manifest must list at least one path"));
        }
        if let Some(bad) = self.assets.iter().find(|a| !a.starts_with('/')) {
            return Err(invalid("assets", format!("{bad} is not an absolute path")));
        }
        if !self.assets.contains(&self.offline_page) {
            return Err(invalid("offline_page", "must be listed in assets"));
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

        for (field, value) in [
            ("reconnect_delay_ms", self.reconnect_delay_ms),
            ("versioner_interval_ms", self.versioner_interval_ms),
            ("update_interval_ms", self.update_interval_ms),
            ("load_retry_delay_ms", self.load_retry_delay_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.token.is_some() && self.username.is_some() {
            tracing::warn!("both token and username are set; the token takes precedence");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: Result<(), ConfigError>) -> String {
        match result {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_origin() {
        let config = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "origin");
    }

    #[test]
    fn test_validate_prefix_collides_with_store() {
        let config = AppConfig { cache_prefix: "api-cache".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "cache_prefix");
    }

    #[test]
    fn test_validate_empty_manifest() {
        let config = AppConfig { assets: Vec::new(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "assets");
    }

    #[test]
    fn test_validate_relative_asset() {
        let config = AppConfig { assets: vec!["/".into(), "style.css".into()], ..Default::default() };
        assert_eq!(field_of(config.validate()), "assets");
    }

    #[test]
    fn test_validate_offline_page_not_in_manifest() {
        let config = AppConfig { offline_page: "/offline.html".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "offline_page");
    }

    #[test]
    fn test_validate_max_bytes_zero() {
        let config = AppConfig { max_bytes: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()), "max_bytes");
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        assert_eq!(field_of(config.validate()), "timeout_ms");

        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        assert_eq!(field_of(config.validate()), "timeout_ms");
    }

    #[test]
    fn test_validate_zero_reconnect_delay() {
        let config = AppConfig { reconnect_delay_ms: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()), "reconnect_delay_ms");
    }

    #[test]
    fn test_validate_zero_versioner_interval() {
        let config = AppConfig { versioner_interval_ms: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()), "versioner_interval_ms");
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "user_agent");
    }
}
