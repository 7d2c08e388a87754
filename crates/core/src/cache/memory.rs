//! Process-local cache store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::entries::CacheEntry;
use super::store::CacheStore;
use crate::Error;

#[derive(Debug, Default)]
struct Inner {
    /// Cache names in creation order.
    order: Vec<String>,
    caches: HashMap<String, HashMap<String, CacheEntry>>,
}

impl Inner {
    fn ensure(&mut self, cache: &str) -> &mut HashMap<String, CacheEntry> {
        if !self.caches.contains_key(cache) {
            self.order.push(cache.to_string());
        }
        self.caches.entry(cache.to_string()).or_default()
    }
}

/// In-memory [`CacheStore`]. Clones share the same underlying caches.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries stored in one cache.
    pub async fn entry_count(&self, cache: &str) -> usize {
        self.inner.read().await.caches.get(cache).map_or(0, HashMap::len)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, cache: &str) -> Result<(), Error> {
        if cache.trim().is_empty() {
            return Err(Error::InvalidInput("cache name cannot be empty".into()));
        }
        self.inner.write().await.ensure(cache);
        Ok(())
    }

    async fn put(&self, cache: &str, entry: CacheEntry) -> Result<(), Error> {
        self.put_all(cache, vec![entry]).await
    }

    async fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> Result<(), Error> {
        if cache.trim().is_empty() {
            return Err(Error::InvalidInput("cache name cannot be empty".into()));
        }
        let mut inner = self.inner.write().await;
        let target = inner.ensure(cache);
        for entry in entries {
            target.insert(entry.identity.clone(), entry);
        }
        Ok(())
    }

    async fn lookup(&self, cache: &str, identity: &str) -> Result<Option<CacheEntry>, Error> {
        let inner = self.inner.read().await;
        Ok(inner.caches.get(cache).and_then(|c| c.get(identity)).cloned())
    }

    async fn delete(&self, cache: &str) -> Result<bool, Error> {
        let mut inner = self.inner.write().await;
        let existed = inner.caches.remove(cache).is_some();
        inner.order.retain(|name| name != cache);
        Ok(existed)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.inner.read().await.order.clone())
    }
}
