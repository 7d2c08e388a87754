//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use reqwest::{StatusCode, header};
use techtalks_core::{CacheEntry, CacheStore, Error as StoreError, Generation, MemoryStore};
use url::Url;

use crate::ClientError;
use crate::fetch::{Network, Request, Response};

pub fn origin() -> Url {
    Url::parse("https://chat.example.com").unwrap()
}

pub fn generation() -> Generation {
    Generation::new("techtalks-v6", NaiveDate::from_ymd_opt(2026, 10, 18).unwrap())
}

/// A network that answers from a table keyed by path (query ignored).
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, (u16, String)>>,
    broken: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    log: Mutex<Vec<Request>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().insert(path.to_string(), (status, body.to_string()));
    }

    /// Make requests for `path` fail at the transport level.
    pub fn break_path(&self, path: &str) {
        self.broken.lock().unwrap().insert(path.to_string());
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn go_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }
}

fn transport_error(url: &Url) -> ClientError {
    ClientError::Network(format!("connection refused: {url}"))
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(request.clone());

        let path = request.url.path().to_string();
        if self.offline.load(Ordering::SeqCst) || self.broken.lock().unwrap().contains(&path) {
            return Err(transport_error(&request.url));
        }

        let route = self.routes.lock().unwrap().get(&path).cloned();
        let (status, body) = route.unwrap_or((404, "not found".to_string()));

        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/octet-stream"));
        Ok(Response {
            url: request.url.clone(),
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: Bytes::from(body),
        })
    }
}

/// A [`MemoryStore`] whose writes, deletes or listing can be made to fail.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    puts: AtomicBool,
    deletes: AtomicBool,
    keys: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self { inner, ..Self::default() }
    }

    pub fn fail_puts(&self) {
        self.puts.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.deletes.store(true, Ordering::SeqCst);
    }

    pub fn fail_keys(&self) {
        self.keys.store(true, Ordering::SeqCst);
    }
}

fn disk_full(flag: &AtomicBool) -> Result<(), StoreError> {
    if flag.load(Ordering::SeqCst) { Err(StoreError::InvalidInput("disk full".into())) } else { Ok(()) }
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn open(&self, cache: &str) -> Result<(), StoreError> {
        self.inner.open(cache).await
    }

    async fn put(&self, cache: &str, entry: CacheEntry) -> Result<(), StoreError> {
        disk_full(&self.puts)?;
        self.inner.put(cache, entry).await
    }

    async fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> Result<(), StoreError> {
        disk_full(&self.puts)?;
        self.inner.put_all(cache, entries).await
    }

    async fn lookup(&self, cache: &str, identity: &str) -> Result<Option<CacheEntry>, StoreError> {
        self.inner.lookup(cache, identity).await
    }

    async fn delete(&self, cache: &str) -> Result<bool, StoreError> {
        disk_full(&self.deletes)?;
        self.inner.delete(cache).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        disk_full(&self.keys)?;
        self.inner.keys().await
    }
}
