//! Subcommand implementations.

pub mod auth;
pub mod cache;
pub mod chat;
pub mod fetch;
pub mod install;
pub mod version;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use techtalks_client::{ApiClient, FetchConfig, HttpNetwork, Interceptor, LocalHost, Worker};
use techtalks_core::{AppConfig, CacheDb};

pub type Store = CacheDb;
pub type LiveWorker = Worker<Store, HttpNetwork, LocalHost>;

/// Store, network and worker built from configuration.
pub struct Context {
    pub store: Arc<Store>,
    pub host: Arc<LocalHost>,
    pub worker: Arc<LiveWorker>,
}

impl Context {
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let store = CacheDb::open(&config.db_path)
            .await
            .with_context(|| format!("opening cache store at {}", config.db_path.display()))?;
        let store = Arc::new(store);
        let network = Arc::new(HttpNetwork::new(FetchConfig::from(config))?);
        let host = Arc::new(LocalHost::new());
        let worker = Arc::new(Worker::new(config, Arc::clone(&store), network, Arc::clone(&host))?);
        Ok(Self { store, host, worker })
    }

    pub fn interceptor(&self) -> Arc<Interceptor<Store, HttpNetwork>> {
        self.worker.interceptor()
    }

    pub fn api(&self, config: &AppConfig) -> ApiClient<Store, HttpNetwork> {
        ApiClient::from_config(self.interceptor(), config)
    }
}
