//! Request classification.

use reqwest::Method;
use techtalks_core::{API_CACHE, Generation, NEWS_CACHE};

use crate::fetch::Request;

/// How an intercepted GET request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// `/api/news`: network first, mirrored into `news-cache`.
    News,
    /// Any other `/api/` path: network first, mirrored into `api-cache`.
    Api,
    /// Everything else: network first, mirrored into the core generation,
    /// with offline page / 503 fallbacks.
    Static,
}

impl Strategy {
    /// Classify a request. Returns None for non-GET requests, which pass
    /// through uncached.
    pub fn classify(request: &Request) -> Option<Self> {
        if request.method != Method::GET {
            return None;
        }

        let path = request.url.path();
        if path.contains("/api/news") {
            Some(Strategy::News)
        } else if path.contains("/api/") {
            Some(Strategy::Api)
        } else {
            Some(Strategy::Static)
        }
    }

    /// Name of the cache this strategy writes to and falls back on.
    pub fn cache_name(self, current: &Generation) -> String {
        match self {
            Strategy::News => NEWS_CACHE.to_string(),
            Strategy::Api => API_CACHE.to_string(),
            Strategy::Static => current.name(),
        }
    }
}
