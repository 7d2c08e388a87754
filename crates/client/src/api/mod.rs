//! Chat backend API, routed through the fetch interceptor.
//!
//! GET endpoints are network first with cache fallback, so an offline client
//! still sees the last messages and news it loaded. Message and news loads
//! retry on a fixed delay while the backend is unreachable and nothing is
//! cached.

pub mod types;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use techtalks_core::{AppConfig, CacheStore};
use url::Url;

use crate::ClientError;
use crate::fetch::{Network, Request, Response, canonicalize};
use crate::worker::Interceptor;

pub use types::{ChatMessage, NewsItem, Session};
use types::{ErrorBody, MessageList, NewsList};

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Registration<'a> {
    username: &'a str,
    password: &'a str,
    public_key: &'a Value,
}

#[derive(Serialize)]
struct NewNews<'a> {
    text: &'a str,
}

/// Client for the chat backend.
pub struct ApiClient<S, N> {
    interceptor: Arc<Interceptor<S, N>>,
    retry_delay: Duration,
    /// None retries forever.
    retry_limit: Option<u32>,
}

impl<S, N> ApiClient<S, N>
where
    S: CacheStore + 'static,
    N: Network + 'static,
{
    pub fn new(interceptor: Arc<Interceptor<S, N>>, retry_delay: Duration, retry_limit: Option<u32>) -> Self {
        Self { interceptor, retry_delay, retry_limit }
    }

    pub fn from_config(interceptor: Arc<Interceptor<S, N>>, config: &AppConfig) -> Self {
        Self::new(interceptor, config.load_retry_delay(), config.load_retry_limit)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        let request = Request::post_json(self.url("/api/login")?, &Credentials { username, password })?;
        let response = self.send(request).await?;
        ok_or_server_error(&response, "login failed")?;
        response.json()
    }

    /// Register a new account. `public_key` is the user's exported key,
    /// passed through as-is.
    pub async fn register(&self, username: &str, password: &str, public_key: &Value) -> Result<Session, ClientError> {
        let body = Registration { username, password, public_key };
        let response = self.send(Request::post_json(self.url("/api/register")?, &body)?).await?;
        ok_or_server_error(&response, "registration failed")?;
        response.json()
    }

    /// Check a stored token. `Ok(None)` means the token was rejected.
    pub async fn validate(&self, token: &str) -> Result<Option<Session>, ClientError> {
        let response = self.send(Request::get(self.url("/api/validate")?).bearer(token)?).await?;
        if !response.is_ok() {
            tracing::info!(status = response.status.as_u16(), "stored token rejected");
            return Ok(None);
        }
        response.json().map(Some)
    }

    /// One attempt at the message list.
    pub async fn messages(&self, token: &str) -> Result<Vec<ChatMessage>, ClientError> {
        let response = self.send(Request::get(self.url("/api/messages")?).bearer(token)?).await?;
        ok_or_status(&response)?;
        Ok(response.json::<MessageList>()?.messages)
    }

    /// Message list, retrying while offline.
    pub async fn load_messages(&self, token: &str) -> Result<Vec<ChatMessage>, ClientError> {
        self.with_retry("messages", || self.messages(token)).await
    }

    /// One attempt at the news list.
    pub async fn news(&self, token: &str) -> Result<Vec<NewsItem>, ClientError> {
        let response = self.send(Request::get(self.url("/api/news")?).bearer(token)?).await?;
        ok_or_status(&response)?;
        Ok(response.json::<NewsList>()?.news)
    }

    /// News list, retrying while offline.
    pub async fn load_news(&self, token: &str) -> Result<Vec<NewsItem>, ClientError> {
        self.with_retry("news", || self.news(token)).await
    }

    /// Post a news item. Only the admin may post, and the text must not be
    /// blank; both are checked before any request is made.
    pub async fn add_news(&self, session: &Session, text: &str) -> Result<(), ClientError> {
        if !session.is_admin() {
            return Err(ClientError::Forbidden("only the admin can post news".into()));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::InvalidInput("news text is empty".into()));
        }

        let request = Request::post_json(self.url("/api/news")?, &NewNews { text })?.bearer(&session.token)?;
        let response = self.send(request).await?;
        ok_or_server_error(&response, "could not add news")
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(canonicalize(self.interceptor.origin(), path)?)
    }

    async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let identity = request.identity();
        self.interceptor.handle(&request).await.into_result(&identity)
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut attempt: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut retries = 0u32;
        loop {
            match attempt().await {
                Err(e) if e.is_offline() && self.retry_limit.is_none_or(|limit| retries < limit) => {
                    retries += 1;
                    tracing::warn!(what, retries, "load failed while offline, retrying: {e}");
                    tokio::time::sleep(self.retry_delay).await;
                }
                result => return result,
            }
        }
    }
}

fn ok_or_status(response: &Response) -> Result<(), ClientError> {
    if response.is_ok() {
        Ok(())
    } else {
        Err(ClientError::Http { status: response.status.as_u16(), message: format!("HTTP error {}", response.status) })
    }
}

/// Non-ok responses carry the server's `error` field when it sent one.
fn ok_or_server_error(response: &Response, fallback: &str) -> Result<(), ClientError> {
    if response.is_ok() {
        return Ok(());
    }
    let message = response.json::<ErrorBody>().ok().and_then(|body| body.error).unwrap_or_else(|| fallback.to_string());
    Err(ClientError::Http { status: response.status.as_u16(), message })
}
