//! Composition root.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use spendsync_cache::CacheLayer;
use spendsync_common::Result;
use spendsync_currency::RateTable;
use spendsync_net::{ApiClient, ConnectivityMonitor, ExpenseApi, HttpApi, TokenStore};
use spendsync_store::LocalStore;
use spendsync_sync::{SyncEngine, SyncScheduler};

use crate::config::AppConfig;
use crate::repository::ExpenseRepository;

/// The wired-up application. Every collaborator is constructed here and
/// nowhere else; embedders pick the pieces they need.
pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<LocalStore>,
    pub cache: Arc<CacheLayer>,
    pub tokens: Arc<TokenStore>,
    pub connectivity: ConnectivityMonitor,
    pub api: Arc<HttpApi>,
    pub rates: Arc<RateTable>,
    pub repository: Arc<ExpenseRepository<HttpApi>>,
    pub engine: Arc<SyncEngine<HttpApi>>,
}

impl AppContext {
    pub fn init(config: AppConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let store = Arc::new(LocalStore::open(config.db_path())?);
        let cache = Arc::new(CacheLayer::new(config.cache_dir())?);
        let tokens = Arc::new(TokenStore::open(config.token_path()));
        // Optimistic until the first probe or failed request says otherwise.
        let connectivity = ConnectivityMonitor::new(true);

        let client = ApiClient::new(
            &config.base_url,
            Arc::clone(&tokens),
            connectivity.clone(),
            config.retry_count,
        )?;
        let api = Arc::new(HttpApi::new(client));
        let rates = Arc::new(RateTable::new());

        let repository = Arc::new(ExpenseRepository::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&api),
            Arc::clone(&tokens),
            connectivity.clone(),
            Arc::clone(&rates),
        ));
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&api),
            connectivity.clone(),
        ));

        info!(base_url = %config.base_url, data_dir = %config.data_dir.display(), "application wired");
        Ok(Self {
            config,
            store,
            cache,
            tokens,
            connectivity,
            api,
            rates,
            repository,
            engine,
        })
    }

    /// Start the background sync driver.
    pub fn start_scheduler(&self) -> SyncScheduler {
        SyncScheduler::spawn(
            Arc::clone(&self.engine),
            Duration::from_secs(self.config.sync_interval_secs),
        )
    }

    /// Probe the server and feed the result into the connectivity
    /// monitor. Going offline→online here is what triggers a sync pass.
    pub async fn probe_health(&self) -> bool {
        let up = self.api.health().await.is_ok();
        debug!(up, "health probe");
        self.connectivity.set_connected(up);
        up
    }
}
