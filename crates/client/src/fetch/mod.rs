//! HTTP fetch pipeline.
//!
//! ### Requests and responses
//! - [`Request`] and [`Response`] are owned snapshots; responses are cheap to
//!   clone (`Bytes` body) so one copy can go to the cache while the other is
//!   returned to the caller.
//! - Non-2xx statuses are responses, not errors. Only transport failures
//!   (DNS, connect, reset, timeout) and oversized bodies are errors.
//!
//! ### URL Canonicalization
//! - Resolve against the configured origin, lowercase host, drop fragments
//! - Preserve query string

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
pub use reqwest::Method;
use reqwest::{Client, StatusCode, header};
use serde::Serialize;
use std::time::{Duration, Instant};
use techtalks_core::{AppConfig, CacheEntry};

use crate::ClientError;

pub use self::url::{UrlError, canonicalize, request_identity, same_origin};
use ::url::Url;

/// Configuration for the HTTP network.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "techtalks/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "techtalks/0.1".to_string(), max_bytes: 5 * 1024 * 1024, timeout: Duration::from_millis(20000) }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), max_bytes: config.max_bytes, timeout: config.timeout() }
    }
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: header::HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: header::HeaderMap::new(), body: None }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST with a JSON body.
    pub fn post_json<T: Serialize>(url: Url, body: &T) -> Result<Self, ClientError> {
        let mut request = Self::new(Method::POST, url);
        request.body = Some(Bytes::from(serde_json::to_vec(body)?));
        request
            .headers
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        Ok(request)
    }

    /// Attach an `Authorization: Bearer` header.
    pub fn bearer(mut self, token: &str) -> Result<Self, ClientError> {
        let value = header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ClientError::InvalidInput(format!("token is not a valid header value: {e}")))?;
        self.headers.insert(header::AUTHORIZATION, value);
        Ok(self)
    }

    /// Cache identity of this request.
    pub fn identity(&self) -> String {
        request_identity(&self.url)
    }

    /// Whether this looks like a page navigation: the root or an `.html` path.
    pub fn is_navigation(&self) -> bool {
        let path = self.url.path();
        path == "/" || path.ends_with(".html")
    }
}

/// A response snapshot.
#[derive(Debug, Clone)]
pub struct Response {
    /// URL that produced the response
    pub url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: header::HeaderMap,
    /// Response body bytes
    pub body: Bytes,
}

impl Response {
    /// True for 2xx statuses.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Synthesized reply for uncached static requests while offline.
    pub fn offline(url: Url) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain"));
        Self { url, status: StatusCode::SERVICE_UNAVAILABLE, headers, body: Bytes::from_static(b"Offline") }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Snapshot for the cache store, keyed by `identity`.
    pub fn to_entry(&self, identity: String) -> CacheEntry {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        CacheEntry::new(identity, self.status.as_u16(), headers, self.body.to_vec())
    }

    /// Rebuild a response from a cache entry.
    pub fn from_entry(entry: CacheEntry) -> Result<Self, ClientError> {
        let url = Url::parse(&entry.identity).map_err(|e| ClientError::Decode(e.to_string()))?;
        let status = StatusCode::from_u16(entry.status).map_err(|e| ClientError::Decode(e.to_string()))?;
        let mut headers = header::HeaderMap::new();
        for (name, value) in entry.headers {
            if let (Ok(name), Ok(value)) =
                (header::HeaderName::from_bytes(name.as_bytes()), header::HeaderValue::from_str(&value))
            {
                headers.append(name, value);
            }
        }
        Ok(Self { url, status, headers, body: Bytes::from(entry.body) })
    }
}

/// Something that can perform a request over the network.
///
/// The worker and API client are generic over this so tests can run them
/// against a scripted network.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, ClientError>;
}

/// Real HTTP network backed by reqwest.
pub struct HttpNetwork {
    http: Client,
    config: FetchConfig,
}

impl HttpNetwork {
    /// Create a new network client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, ClientError> {
        let start = Instant::now();

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.as_str())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(ClientError::TooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        if body.len() > self.config.max_bytes {
            return Err(ClientError::TooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        tracing::debug!(
            "{} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(Response { url, status, headers, body })
    }
}
