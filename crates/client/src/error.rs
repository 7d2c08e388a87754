//! Client error types.

use std::sync::Arc;

use crate::fetch::UrlError;

/// Errors from the fetch pipeline, the worker and the API client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a response (DNS, connect, reset, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// Network unreachable and nothing cached for the request.
    #[error("offline: no cached response for {0}")]
    Offline(String),

    /// Response body exceeded the configured limit.
    #[error("response too large: {0}")]
    TooLarge(String),

    #[error(transparent)]
    InvalidUrl(#[from] UrlError),

    /// Cache store failure.
    #[error("cache: {0}")]
    Cache(Arc<techtalks_core::Error>),

    /// Non-ok HTTP status from the backend.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// A manifest asset could not be fetched during install.
    #[error("install failed at {asset}: {reason}")]
    InstallFailed { asset: String, reason: String },

    /// Lifecycle transition requested from the wrong state.
    #[error("invalid worker transition: {0}")]
    InvalidTransition(String),

    /// Local permission check failed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// WebSocket handshake or transport failure.
    #[error("channel error: {0}")]
    Channel(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),
}

impl ClientError {
    /// Whether the failure means "could not reach the backend and nothing
    /// was cached", the case message and news loads retry on.
    pub fn is_offline(&self) -> bool {
        matches!(self, ClientError::Offline(_) | ClientError::Network(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

impl From<techtalks_core::Error> for ClientError {
    fn from(err: techtalks_core::Error) -> Self {
        ClientError::Cache(Arc::new(err))
    }
}

impl From<techtalks_core::ConfigError> for ClientError {
    fn from(err: techtalks_core::ConfigError) -> Self {
        ClientError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Channel(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::Http { status: 403, message: "admin only".into() };
        assert_eq!(err.to_string(), "HTTP 403: admin only");

        let err = ClientError::InstallFailed { asset: "/style.css".into(), reason: "status 404".into() };
        assert!(err.to_string().contains("/style.css"));
    }

    #[test]
    fn test_is_offline() {
        assert!(ClientError::Offline("https://example.com/api/news".into()).is_offline());
        assert!(ClientError::Network("connection reset".into()).is_offline());
        assert!(!ClientError::Http { status: 500, message: String::new() }.is_offline());
    }
}
