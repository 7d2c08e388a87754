//! Offline worker: lifecycle controller plus fetch interceptor.
//!
//! ### Caches
//! - `<prefix>-YYYY-MM-DD`: core assets, pre-populated at install
//! - `api-cache`, `news-cache`: mirrored API responses, survive activation
//!
//! ### Lifecycle
//! - Install fetches the whole asset manifest with `?v=<generation>` and
//!   writes it in one batch, then signals skip-waiting
//! - Activate evicts stale generations and claims open clients
//! - A periodic update check installs a new generation when the build date
//!   moves

pub mod control;
pub mod intercept;
pub mod lifecycle;
pub mod strategy;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use techtalks_core::{AppConfig, CacheStore, Generation};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

use crate::ClientError;
use crate::fetch::Network;

pub use control::ControlMessage;
pub use intercept::{Interception, Interceptor};
pub use lifecycle::{ActivateReport, Lifecycle, WorkerState};
pub use strategy::Strategy;

/// The install-time identity of `url` for `generation`.
pub fn versioned(url: &Url, generation: &Generation) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut().append_pair("v", &generation.name());
    url
}

/// The environment a worker runs in.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Let an installed version take over without waiting for old clients to
    /// go away.
    fn skip_waiting(&self);

    fn waiting_skipped(&self) -> bool;

    /// Take control of every open client. Returns how many were claimed.
    async fn claim_clients(&self) -> usize;
}

/// In-process host. Clients are counted, not tracked.
#[derive(Debug)]
pub struct LocalHost {
    auto_skip: bool,
    skip: AtomicBool,
    clients: AtomicUsize,
}

impl LocalHost {
    pub fn new() -> Self {
        Self { auto_skip: true, skip: AtomicBool::new(false), clients: AtomicUsize::new(0) }
    }

    /// A host that ignores skip-waiting from install and only honors the
    /// `skipWaiting` control message.
    pub fn without_auto_skip() -> Self {
        Self { auto_skip: false, ..Self::new() }
    }

    pub fn register_client(&self) {
        self.clients.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerHost for LocalHost {
    fn skip_waiting(&self) {
        if self.auto_skip {
            self.skip.store(true, Ordering::SeqCst);
        }
    }

    fn waiting_skipped(&self) -> bool {
        self.skip.load(Ordering::SeqCst)
    }

    async fn claim_clients(&self) -> usize {
        self.skip.store(false, Ordering::SeqCst);
        self.clients.load(Ordering::SeqCst)
    }
}

/// A configured worker: lifecycle behind a lock, interceptor shared.
pub struct Worker<S, N, H> {
    lifecycle: Mutex<Lifecycle<S, N, H>>,
    interceptor: Arc<Interceptor<S, N>>,
    config: AppConfig,
}

impl<S, N, H> Worker<S, N, H>
where
    S: CacheStore + 'static,
    N: Network + 'static,
    H: WorkerHost + 'static,
{
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the origin is not a valid URL.
    pub fn new(config: &AppConfig, store: Arc<S>, network: Arc<N>, host: Arc<H>) -> Result<Self, ClientError> {
        let origin = config.origin_url()?;
        let lifecycle = Lifecycle::new(
            Arc::clone(&store),
            Arc::clone(&network),
            host,
            origin.clone(),
            config.assets.clone(),
            config.generation(),
        );
        let interceptor = Interceptor::new(store, network, lifecycle.subscribe(), origin, &config.offline_page);
        Ok(Self { lifecycle: Mutex::new(lifecycle), interceptor: Arc::new(interceptor), config: config.clone() })
    }

    pub fn interceptor(&self) -> Arc<Interceptor<S, N>> {
        Arc::clone(&self.interceptor)
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.lock().await.state()
    }

    pub async fn active_generation(&self) -> Generation {
        self.lifecycle.lock().await.active_generation()
    }

    /// Install the configured generation and activate it.
    pub async fn start(&self) -> Result<Option<ActivateReport>, ClientError> {
        self.lifecycle.lock().await.start(self.config.generation()).await
    }

    pub async fn handle_control(&self, message: &str) -> Result<Option<ActivateReport>, ClientError> {
        self.lifecycle.lock().await.handle_control(message).await
    }

    pub async fn check_for_update(&self) -> Result<Option<ActivateReport>, ClientError> {
        self.lifecycle.lock().await.check_for_update(self.config.generation()).await
    }

    /// Check for a new generation every `interval`. The first check runs
    /// after one full interval.
    pub fn spawn_update_checks(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                match worker.check_for_update().await {
                    Ok(Some(report)) => tracing::info!(generation = %report.generation, "worker updated"),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("update check failed: {e}"),
                }
            }
        })
    }
}
