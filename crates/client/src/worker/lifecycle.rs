//! Worker lifecycle: install, activate, takeover.

use std::sync::Arc;

use techtalks_core::{CacheStore, Generation};
use tokio::sync::watch;
use url::Url;

use super::{ControlMessage, WorkerHost, versioned};
use crate::ClientError;
use crate::fetch::{Network, Request, canonicalize};

/// Lifecycle state of the most recent worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Active,
    /// Install failed; this version will never activate.
    Redundant,
}

/// Result of a completed activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub generation: Generation,
    /// Cache names evicted.
    pub deleted: Vec<String>,
    /// Clients taken over.
    pub claimed: usize,
}

/// Drives one worker through its lifecycle against an injectable store,
/// network and host.
pub struct Lifecycle<S, N, H> {
    store: Arc<S>,
    network: Arc<N>,
    host: Arc<H>,
    origin: Url,
    manifest: Vec<String>,
    state: WorkerState,
    pending: Option<Generation>,
    active: watch::Sender<Generation>,
    activated: bool,
}

impl<S, N, H> Lifecycle<S, N, H>
where
    S: CacheStore,
    N: Network,
    H: WorkerHost,
{
    /// `initial` seeds the generation static writes go to until the first
    /// activation.
    pub fn new(
        store: Arc<S>, network: Arc<N>, host: Arc<H>, origin: Url, manifest: Vec<String>, initial: Generation,
    ) -> Self {
        let (active, _) = watch::channel(initial);
        Self {
            store,
            network,
            host,
            origin,
            manifest,
            state: WorkerState::Parsed,
            pending: None,
            active,
            activated: false,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Generation currently serving static requests.
    pub fn active_generation(&self) -> Generation {
        self.active.borrow().clone()
    }

    /// Receiver that follows the active generation.
    pub fn subscribe(&self) -> watch::Receiver<Generation> {
        self.active.subscribe()
    }

    /// Pre-populate the core cache for `generation`.
    ///
    /// Every manifest asset is fetched with `?v=<generation>` appended. The
    /// entries are only written once all of them have been fetched, in one
    /// batch, so a failed attempt leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InstallFailed` naming the first asset that could
    /// not be fetched or came back non-ok.
    pub async fn install(&mut self, generation: Generation) -> Result<(), ClientError> {
        self.state = WorkerState::Installing;
        tracing::info!(%generation, assets = self.manifest.len(), "installing core assets");

        match self.fetch_manifest(&generation).await {
            Ok(entries) => {
                let cache = generation.name();
                if let Err(e) = self.store.put_all(&cache, entries).await {
                    tracing::error!(%generation, "failed to store core assets: {e}");
                    self.state = WorkerState::Redundant;
                    return Err(e.into());
                }
            }
            Err(e) => {
                tracing::error!(%generation, "install failed: {e}");
                self.state = WorkerState::Redundant;
                return Err(e);
            }
        }

        self.pending = Some(generation);
        self.state = WorkerState::Installed;
        self.host.skip_waiting();
        Ok(())
    }

    async fn fetch_manifest(&self, generation: &Generation) -> Result<Vec<techtalks_core::CacheEntry>, ClientError> {
        let mut entries = Vec::with_capacity(self.manifest.len());
        for asset in &self.manifest {
            let failed = |reason: String| ClientError::InstallFailed { asset: asset.clone(), reason };

            let url = canonicalize(&self.origin, asset).map_err(|e| failed(e.to_string()))?;
            let request = Request::get(versioned(&url, generation));
            let response = self.network.fetch(&request).await.map_err(|e| failed(e.to_string()))?;
            if !response.is_ok() {
                return Err(failed(format!("status {}", response.status.as_u16())));
            }
            entries.push(response.to_entry(request.identity()));
        }
        Ok(entries)
    }

    /// Promote the installed generation.
    ///
    /// Deletes every cache except the new generation, `api-cache` and
    /// `news-cache`, then claims all open clients. Deletion failures are
    /// logged and skipped.
    pub async fn activate(&mut self) -> Result<ActivateReport, ClientError> {
        let Some(generation) = self.pending.take().filter(|_| self.state == WorkerState::Installed) else {
            return Err(ClientError::InvalidTransition(format!("cannot activate from {:?}", self.state)));
        };
        self.state = WorkerState::Activating;

        let mut deleted = Vec::new();
        match self.store.keys().await {
            Ok(names) => {
                for name in names.into_iter().filter(|n| generation.is_stale(n)) {
                    match self.store.delete(&name).await {
                        Ok(_) => {
                            tracing::info!(cache = %name, "removed old cache");
                            deleted.push(name);
                        }
                        Err(e) => tracing::warn!(cache = %name, "failed to remove old cache: {e}"),
                    }
                }
            }
            Err(e) => tracing::warn!("could not enumerate caches, skipping cleanup: {e}"),
        }

        self.active.send_replace(generation.clone());
        self.activated = true;
        let claimed = self.host.claim_clients().await;
        self.state = WorkerState::Active;
        tracing::info!(%generation, claimed, "worker active");

        Ok(ActivateReport { generation, deleted, claimed })
    }

    /// Install `generation` and activate it once the host lets it skip
    /// waiting.
    pub async fn start(&mut self, generation: Generation) -> Result<Option<ActivateReport>, ClientError> {
        self.install(generation).await?;
        if self.host.waiting_skipped() { self.activate().await.map(Some) } else { Ok(None) }
    }

    /// Handle a control message posted by a page.
    ///
    /// `skipWaiting` lets a version that is installed and waiting take over
    /// immediately. Unknown messages are ignored.
    pub async fn handle_control(&mut self, message: &str) -> Result<Option<ActivateReport>, ClientError> {
        match ControlMessage::parse(message) {
            Some(ControlMessage::SkipWaiting) => {
                self.host.skip_waiting();
                if self.state == WorkerState::Installed { self.activate().await.map(Some) } else { Ok(None) }
            }
            None => {
                tracing::warn!(message, "ignoring unknown control message");
                Ok(None)
            }
        }
    }

    /// Install and activate `generation` if it differs from the active one.
    pub async fn check_for_update(&mut self, generation: Generation) -> Result<Option<ActivateReport>, ClientError> {
        if self.activated && *self.active.borrow() == generation {
            tracing::debug!(%generation, "worker up to date");
            return Ok(None);
        }
        tracing::info!(%generation, "new worker generation available");
        self.start(generation).await
    }
}
