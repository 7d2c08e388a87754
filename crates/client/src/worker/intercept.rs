//! The fetch interceptor.
//!
//! Every request the client makes goes through [`Interceptor::handle`].
//! GET requests are served network first; a copy of the network response is
//! written to the matching cache by a background task so the write can never
//! delay or fail the response. When the network fails the cache answers.

use std::sync::Arc;

use techtalks_core::{CacheEntry, CacheStore, Generation};
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use url::Url;

use super::strategy::Strategy;
use super::versioned;
use crate::ClientError;
use crate::fetch::{Network, Request, Response, canonicalize, request_identity};

/// Outcome of intercepting one request.
#[derive(Debug)]
pub enum Interception {
    /// Non-GET request, forwarded untouched.
    Passthrough(Result<Response, ClientError>),
    /// Live network response.
    Network(Response),
    /// Network failed; served from cache.
    Cache(Response),
    /// Network failed on an uncached navigation; offline page served.
    OfflinePage(Response),
    /// Network failed on an uncached static asset; synthesized 503.
    Unavailable(Response),
    /// Network failed on an API request with nothing cached.
    Miss,
}

impl Interception {
    /// The response handed to the page, if any.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Interception::Passthrough(result) => result.ok(),
            Interception::Network(r)
            | Interception::Cache(r)
            | Interception::OfflinePage(r)
            | Interception::Unavailable(r) => Some(r),
            Interception::Miss => None,
        }
    }

    /// Convert into a result, treating a cache miss as offline.
    pub fn into_result(self, identity: &str) -> Result<Response, ClientError> {
        match self {
            Interception::Passthrough(result) => result,
            Interception::Miss => Err(ClientError::Offline(identity.to_string())),
            other => other.into_response().ok_or_else(|| ClientError::Offline(identity.to_string())),
        }
    }

    pub fn is_from_network(&self) -> bool {
        matches!(self, Interception::Network(_) | Interception::Passthrough(Ok(_)))
    }
}

/// Network-first interceptor over an injectable cache store and network.
pub struct Interceptor<S, N> {
    store: Arc<S>,
    network: Arc<N>,
    generation: watch::Receiver<Generation>,
    origin: Url,
    offline_page: String,
    writes: TaskTracker,
}

impl<S, N> Interceptor<S, N>
where
    S: CacheStore + 'static,
    N: Network + 'static,
{
    /// `generation` tracks the active core generation; static responses are
    /// written to whatever it holds at the time of the request, unless it has
    /// moved on by the time the write runs.
    pub fn new(
        store: Arc<S>, network: Arc<N>, generation: watch::Receiver<Generation>, origin: Url,
        offline_page: impl Into<String>,
    ) -> Self {
        Self { store, network, generation, origin, offline_page: offline_page.into(), writes: TaskTracker::new() }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Serve one request.
    pub async fn handle(&self, request: &Request) -> Interception {
        let Some(strategy) = Strategy::classify(request) else {
            return Interception::Passthrough(self.network.fetch(request).await);
        };

        let generation = self.generation.borrow().clone();
        let cache = strategy.cache_name(&generation);
        let identity = request.identity();

        match self.network.fetch(request).await {
            Ok(response) => {
                // Static assets are only cached when ok; API responses are
                // mirrored whatever their status.
                if strategy != Strategy::Static || response.is_ok() {
                    self.spawn_write(strategy, cache, response.to_entry(identity));
                }
                Interception::Network(response)
            }
            Err(err) => {
                tracing::debug!(%identity, ?strategy, "network failed, falling back to cache: {err}");
                match strategy {
                    Strategy::Static => self.static_fallback(request, &generation, &cache).await,
                    Strategy::Api | Strategy::News => match self.read(&cache, &identity).await {
                        Some(response) => Interception::Cache(response),
                        None => Interception::Miss,
                    },
                }
            }
        }
    }

    /// Wait for every background cache write started so far.
    pub async fn flush(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    async fn static_fallback(&self, request: &Request, generation: &Generation, cache: &str) -> Interception {
        if let Some(response) = self.read_core(cache, &request.url, generation).await {
            return Interception::Cache(response);
        }

        if request.is_navigation() {
            match canonicalize(&self.origin, &self.offline_page) {
                Ok(page) => {
                    if let Some(response) = self.read_core(cache, &page, generation).await {
                        return Interception::OfflinePage(response);
                    }
                    tracing::warn!(offline_page = %page, "offline page missing from core cache");
                }
                Err(e) => tracing::warn!("invalid offline page {}: {e}", self.offline_page),
            }
        }

        Interception::Unavailable(Response::offline(request.url.clone()))
    }

    /// Core cache lookup: exact identity first, then the install-time
    /// versioned identity.
    async fn read_core(&self, cache: &str, url: &Url, generation: &Generation) -> Option<Response> {
        if let Some(response) = self.read(cache, &request_identity(url)).await {
            return Some(response);
        }
        self.read(cache, &request_identity(&versioned(url, generation))).await
    }

    async fn read(&self, cache: &str, identity: &str) -> Option<Response> {
        let entry = match self.store.lookup(cache, identity).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(cache, identity, "cache lookup failed: {e}");
                return None;
            }
        };
        match Response::from_entry(entry) {
            Ok(response) => {
                tracing::debug!(cache, identity, "cache hit");
                Some(response)
            }
            Err(e) => {
                tracing::warn!(cache, identity, "unreadable cache entry: {e}");
                None
            }
        }
    }

    /// A static write is dropped if the core generation changed since the
    /// request started, so an evicted generation is not recreated.
    fn spawn_write(&self, strategy: Strategy, cache: String, entry: CacheEntry) {
        let store = Arc::clone(&self.store);
        let generation = self.generation.clone();
        self.writes.spawn(async move {
            if strategy == Strategy::Static && generation.borrow().name() != cache {
                tracing::debug!(cache, "generation changed, dropping cache write");
                return;
            }
            if let Err(e) = store.put(&cache, entry).await {
                tracing::warn!(cache, "background cache write failed: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingStore, ScriptedNetwork, generation, origin};
    use chrono::NaiveDate;
    use reqwest::{Method, StatusCode};
    use techtalks_core::{API_CACHE, MemoryStore, NEWS_CACHE};

    fn interceptor(store: &MemoryStore, network: &Arc<ScriptedNetwork>) -> Interceptor<MemoryStore, ScriptedNetwork> {
        let (_tx, rx) = watch::channel(generation());
        Interceptor::new(Arc::new(store.clone()), Arc::clone(network), rx, origin(), "/404.html")
    }

    fn get(path: &str) -> Request {
        Request::get(origin().join(path).unwrap())
    }

    async fn seed(store: &MemoryStore, cache: &str, path: &str, body: &str) {
        let url = origin().join(path).unwrap();
        store
            .put(cache, CacheEntry::new(request_identity(&url), 200, vec![], body.as_bytes().to_vec()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_static_success_returns_network_and_caches() {
        let store = MemoryStore::new();
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/style.css", 200, "body{}");
        let interceptor = interceptor(&store, &network);

        let result = interceptor.handle(&get("/style.css")).await;
        assert!(result.is_from_network());
        assert_eq!(result.into_response().unwrap().text(), "body{}");

        interceptor.flush().await;
        let cached = store
            .lookup(&generation().name(), "https://chat.example.com/style.css")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.body, b"body{}");
    }

    #[tokio::test]
    async fn test_failed_cache_write_keeps_network_response() {
        let store = Arc::new(FailingStore::new(MemoryStore::new()));
        store.fail_puts();
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/style.css", 200, "body{}");
        network.respond("/api/messages", 200, r#"{"messages":[]}"#);
        let (_tx, rx) = watch::channel(generation());
        let interceptor = Interceptor::new(Arc::clone(&store), network, rx, origin(), "/404.html");

        let result = interceptor.handle(&get("/style.css")).await;
        assert!(result.is_from_network());
        assert_eq!(result.into_response().unwrap().text(), "body{}");
        let result = interceptor.handle(&get("/api/messages")).await;
        assert_eq!(result.into_response().unwrap().status, StatusCode::OK);

        interceptor.flush().await;
        assert!(store.inner.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_write_skipped_after_generation_change() {
        let store = MemoryStore::new();
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/style.css", 200, "body{}");
        network.respond("/api/news", 200, r#"{"news":[]}"#);
        let (tx, rx) = watch::channel(generation());
        let interceptor = Interceptor::new(Arc::new(store.clone()), network, rx, origin(), "/404.html");

        interceptor.handle(&get("/style.css")).await;
        interceptor.handle(&get("/api/news")).await;
        let next = Generation::new("techtalks-v6", NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        tx.send_replace(next);
        interceptor.flush().await;

        assert_eq!(store.keys().await.unwrap(), vec![NEWS_CACHE.to_string()]);
    }

    #[tokio::test]
    async fn test_static_non_ok_is_not_cached() {
        let store = MemoryStore::new();
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/missing.png", 404, "nope");
        let interceptor = interceptor(&store, &network);

        let response = interceptor.handle(&get("/missing.png")).await.into_response().unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        interceptor.flush().await;
        assert_eq!(store.entry_count(&generation().name()).await, 0);
    }

    #[tokio::test]
    async fn test_static_offline_serves_cached() {
        let store = MemoryStore::new();
        seed(&store, &generation().name(), "/style.css", "cached-css").await;
        let network = Arc::new(ScriptedNetwork::new());
        network.go_offline();
        let interceptor = interceptor(&store, &network);

        let result = interceptor.handle(&get("/style.css")).await;
        assert!(matches!(&result, Interception::Cache(_)));
        assert_eq!(result.into_response().unwrap().text(), "cached-css");
    }

    #[tokio::test]
    async fn test_static_offline_serves_install_versioned_entry() {
        let store = MemoryStore::new();
        let versioned_path = format!("/script.js?v={}", generation().name());
        seed(&store, &generation().name(), &versioned_path, "cached-js").await;
        let network = Arc::new(ScriptedNetwork::new());
        network.go_offline();
        let interceptor = interceptor(&store, &network);

        let response = interceptor.handle(&get("/script.js")).await.into_response().unwrap();
        assert_eq!(response.text(), "cached-js");
    }

    #[tokio::test]
    async fn test_navigation_offline_serves_offline_page() {
        let store = MemoryStore::new();
        seed(&store, &generation().name(), "/404.html", "offline page").await;
        let network = Arc::new(ScriptedNetwork::new());
        network.go_offline();
        let interceptor = interceptor(&store, &network);

        for path in ["/", "/about.html"] {
            let result = interceptor.handle(&get(path)).await;
            assert!(matches!(&result, Interception::OfflinePage(_)), "{path}");
            assert_eq!(result.into_response().unwrap().text(), "offline page");
        }
    }

    #[tokio::test]
    async fn test_uncached_asset_offline_is_503() {
        let store = MemoryStore::new();
        let network = Arc::new(ScriptedNetwork::new());
        network.go_offline();
        let interceptor = interceptor(&store, &network);

        let result = interceptor.handle(&get("/okak-cat.png")).await;
        assert!(matches!(&result, Interception::Unavailable(_)));
        let response = result.into_response().unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.text(), "Offline");
    }

    #[tokio::test]
    async fn test_api_offline_returns_cached_or_miss() {
        let store = MemoryStore::new();
        seed(&store, API_CACHE, "/api/messages", r#"{"messages":[]}"#).await;
        let network = Arc::new(ScriptedNetwork::new());
        network.go_offline();
        let interceptor = interceptor(&store, &network);

        let hit = interceptor.handle(&get("/api/messages")).await;
        assert_eq!(hit.into_response().unwrap().text(), r#"{"messages":[]}"#);

        let miss = interceptor.handle(&get("/api/validate")).await;
        assert!(matches!(miss, Interception::Miss));
    }

    #[tokio::test]
    async fn test_news_writes_to_news_cache_only() {
        let store = MemoryStore::new();
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/api/news", 200, r#"{"news":[]}"#);
        let interceptor = interceptor(&store, &network);

        interceptor.handle(&get("/api/news")).await;
        interceptor.flush().await;

        assert_eq!(store.entry_count(NEWS_CACHE).await, 1);
        assert_eq!(store.entry_count(API_CACHE).await, 0);
    }

    #[tokio::test]
    async fn test_api_error_status_still_mirrored() {
        let store = MemoryStore::new();
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/api/messages", 401, r#"{"error":"unauthorized"}"#);
        let interceptor = interceptor(&store, &network);

        let response = interceptor.handle(&get("/api/messages")).await.into_response().unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        interceptor.flush().await;
        assert_eq!(store.entry_count(API_CACHE).await, 1);
    }

    #[tokio::test]
    async fn test_non_get_passes_through_uncached() {
        let store = MemoryStore::new();
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/api/news", 201, "{}");
        let interceptor = interceptor(&store, &network);

        let mut request = get("/api/news");
        request.method = Method::POST;
        let result = interceptor.handle(&request).await;
        assert!(matches!(&result, Interception::Passthrough(Ok(_))));

        interceptor.flush().await;
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_get_offline_surfaces_error() {
        let store = MemoryStore::new();
        seed(&store, NEWS_CACHE, "/api/news", "{}").await;
        let network = Arc::new(ScriptedNetwork::new());
        network.go_offline();
        let interceptor = interceptor(&store, &network);

        let mut request = get("/api/news");
        request.method = Method::POST;
        let result = interceptor.handle(&request).await;
        assert!(matches!(result, Interception::Passthrough(Err(_))));
    }

    #[tokio::test]
    async fn test_into_result_maps_miss_to_offline() {
        let err = Interception::Miss.into_result("https://chat.example.com/api/x").unwrap_err();
        assert!(matches!(err, ClientError::Offline(_)));
    }
}
