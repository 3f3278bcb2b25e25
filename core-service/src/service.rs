//! # Share Drive Service
//!
//! The driver façade: one instance per configured share link.
//!
//! ## Lifecycle
//!
//! 1. [`ShareDriveService::new`] wires the share session, connector and
//!    materialization cache. No network traffic happens yet.
//! 2. [`ShareDriveService::init`] obtains the access and share tokens and
//!    starts the background credential refresh cycle.
//! 3. `list` / `link` / `other` serve requests. `list` and `link` go through
//!    front-door rate limiters.
//! 4. [`ShareDriveService::shutdown`] stops the refresh cycle, forgets the
//!    learned drive id and, if this driver owns its cache, drains pending
//!    eviction deletions.

use bridge_traits::backing::{BackingDrive, DownloadLink};
use bridge_traits::http::HttpClient;
use core_auth::{CredentialManager, ShareSession};
use core_cache::MaterializationCache;
use core_runtime::config::DriverConfig;
use core_runtime::events::EventStream;
use core_runtime::schedule::PeriodicTask;
use provider_share_drive::{ShareDriveConnector, ShareFile};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::adapter::ShareBackingAdapter;
use crate::error::{CoreError, Result};
use crate::rate_limit::RateLimiter;

pub struct ShareDriveService {
    config: DriverConfig,
    manager: Arc<CredentialManager>,
    connector: Arc<ShareDriveConnector>,
    cache: Arc<MaterializationCache>,
    owns_cache: bool,
    list_limiter: RateLimiter,
    link_limiter: RateLimiter,
    refresh_task: Mutex<Option<PeriodicTask>>,
    shut_down: AtomicBool,
}

impl ShareDriveService {
    /// Build a driver with its own materialization cache.
    ///
    /// Copies go to the document's `temp_folder_id` on `backing`; the cache
    /// holds at most `max_temp_file_size` of them.
    pub async fn new(
        config: DriverConfig,
        manager: Arc<CredentialManager>,
        backing: Arc<dyn BackingDrive>,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        config.validate()?;
        let document = manager.token_store().document().await;
        let connector = Self::build_connector(&config, &manager, http_client, &document);

        let adapter = Arc::new(ShareBackingAdapter::new(
            Arc::clone(&connector),
            backing,
            document.temp_folder_id.clone(),
        ));
        let max_entries = usize::try_from(document.max_temp_file_size).unwrap_or(usize::MAX);
        let cache = Arc::new(MaterializationCache::new(
            adapter,
            max_entries,
            config.eviction_queue_capacity,
            Some(manager.event_bus().clone()),
        ));

        Ok(Self::assemble(config, manager, connector, cache, true))
    }

    /// Build a driver that resolves links through an existing cache.
    ///
    /// The cache must have been built for the same share. This driver never
    /// shuts it down.
    pub async fn with_shared_cache(
        config: DriverConfig,
        manager: Arc<CredentialManager>,
        http_client: Arc<dyn HttpClient>,
        cache: Arc<MaterializationCache>,
    ) -> Result<Self> {
        config.validate()?;
        let document = manager.token_store().document().await;
        let connector = Self::build_connector(&config, &manager, http_client, &document);

        Ok(Self::assemble(config, manager, connector, cache, false))
    }

    fn build_connector(
        config: &DriverConfig,
        manager: &Arc<CredentialManager>,
        http_client: Arc<dyn HttpClient>,
        document: &core_runtime::config::ShareCacheConfig,
    ) -> Arc<ShareDriveConnector> {
        let session = Arc::new(ShareSession::new(
            Arc::clone(manager),
            config.share_id.clone(),
            config.share_pwd.clone(),
            config.auth_retry_budget,
        ));

        // Per-driver ordering wins over the document's
        let order_by = Some(config.order_by.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(document.order_by.as_str());
        let order_direction = Some(config.order_direction.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(document.order_direction.as_str());

        Arc::new(ShareDriveConnector::new(
            http_client,
            session,
            order_by,
            order_direction,
        ))
    }

    fn assemble(
        config: DriverConfig,
        manager: Arc<CredentialManager>,
        connector: Arc<ShareDriveConnector>,
        cache: Arc<MaterializationCache>,
        owns_cache: bool,
    ) -> Self {
        Self {
            list_limiter: RateLimiter::new("list", config.list_min_interval),
            link_limiter: RateLimiter::new("link", config.link_min_interval),
            config,
            manager,
            connector,
            cache,
            owns_cache,
            refresh_task: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<MaterializationCache> {
        &self.cache
    }

    pub fn connector(&self) -> &Arc<ShareDriveConnector> {
        &self.connector
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.manager.event_bus().subscribe())
    }

    /// Obtain both share credentials and start the refresh cycle.
    #[instrument(skip(self), fields(share_id = %self.config.share_id))]
    pub async fn init(&self) -> Result<()> {
        self.ensure_running()?;

        self.manager.ensure_access_token().await?;
        self.connector.session().refresh_share_token().await?;

        let mut task = self.refresh_task.lock().await;
        if let Some(previous) = task.take() {
            previous.stop().await;
        }
        *task = Some(self.manager.start_refresh_cycle(self.config.refresh_interval));

        info!("Share driver initialized");
        Ok(())
    }

    /// List the entries of `folder_id` (the configured root when `None`).
    pub async fn list(&self, folder_id: Option<&str>) -> Result<Vec<ShareFile>> {
        self.ensure_running()?;
        self.list_limiter.acquire().await;

        let folder_id = folder_id.unwrap_or(self.config.root_folder_id.as_str());
        Ok(self.connector.list_directory(folder_id).await?)
    }

    /// Download link for the shared file `file_id`, materializing it if needed.
    pub async fn link(&self, file_id: &str, name: &str) -> Result<DownloadLink> {
        self.ensure_running()?;
        self.link_limiter.acquire().await;

        Ok(self.cache.resolve_link(file_id, name).await?)
    }

    /// Proxy a preview request (`doc_preview` or `video_preview`).
    pub async fn other(&self, method: &str, file_id: &str) -> Result<serde_json::Value> {
        self.ensure_running()?;
        Ok(self.connector.other(method, file_id).await?)
    }

    /// Stop background work. Idempotent.
    #[instrument(skip(self), fields(share_id = %self.config.share_id))]
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(task) = self.refresh_task.lock().await.take() {
            task.stop().await;
        }
        self.connector.clear_drive_id().await;
        if self.owns_cache {
            self.cache.shutdown().await;
        }

        info!("Share driver shut down");
    }

    pub async fn is_refreshing(&self) -> bool {
        self.refresh_task
            .lock()
            .await
            .as_ref()
            .map(PeriodicTask::is_running)
            .unwrap_or(false)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(CoreError::ShutDown);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ShareDriveService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareDriveService")
            .field("config", &self.config)
            .field("owns_cache", &self.owns_cache)
            .finish()
    }
}

