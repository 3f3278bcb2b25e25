//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP transport and
//! config document storage) into the share-drive driver. Desktop hosts
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) and call [`bootstrap_desktop`].

pub mod adapter;
pub mod error;
pub mod rate_limit;
pub mod service;

pub use adapter::ShareBackingAdapter;
pub use error::{CoreError, Result};
pub use rate_limit::RateLimiter;
pub use service::ShareDriveService;

pub use bridge_traits::backing::DownloadLink;
pub use core_runtime::config::{DriverConfig, ShareCacheConfig};
pub use core_runtime::events::{CoreEvent, EventBus};
pub use provider_share_drive::{FileKind, ShareFile};

use std::sync::Arc;

use bridge_traits::{http::HttpClient, storage::ConfigStore};
use core_auth::{CredentialManager, TokenClient, TokenStore};
use provider_open_drive::{OpenDriveClient, OpenDriveConfig};
use tracing::{error, info};

/// Aggregated handle to the bridge dependencies the driver requires.
#[derive(Clone)]
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub config_store: Arc<dyn ConfigStore>,
    pub event_bus: EventBus,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(http_client: Arc<dyn HttpClient>, config_store: Arc<dyn ConfigStore>) -> Self {
        Self {
            http_client,
            config_store,
            event_bus: EventBus::default(),
        }
    }
}

/// Load the cache config document, bring up the backing drive and start a driver.
///
/// A backing drive that fails to initialize is logged and left in place:
/// listing still works, link resolution fails until the refresh cycle
/// reaches the drive and learns its id. Rotated backing refresh tokens are
/// written to the config store as soon as the drive reports them.
pub async fn bootstrap(deps: CoreDependencies, config: DriverConfig) -> Result<ShareDriveService> {
    info!(location = %deps.config_store.location(), "Loading cache config");
    let token_store = TokenStore::load(Arc::clone(&deps.config_store)).await;
    let document = token_store.document().await;

    let backing = Arc::new(
        OpenDriveClient::new(
            Arc::clone(&deps.http_client),
            OpenDriveConfig::from_document(&document),
        )
        .with_refresh_token_sink(Arc::new(token_store.clone())),
    );
    if let Err(e) = backing.init().await {
        error!(error = %e, "Failed to initialize backing drive");
    }

    let manager = Arc::new(
        CredentialManager::new(
            TokenClient::new(Arc::clone(&deps.http_client)),
            token_store,
            deps.event_bus,
        )
        .with_backing(backing.clone()),
    );

    let service = ShareDriveService::new(config, manager, backing, deps.http_client).await?;
    service.init().await?;
    Ok(service)
}

/// [`bootstrap`] with the reqwest transport and the JSON file config store
/// (`CACHE_CONFIG_PATH`, or the platform data directory).
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(config: DriverConfig) -> Result<ShareDriveService> {
    use bridge_desktop::{JsonFileConfigStore, ReqwestHttpClient};

    let http_client = Arc::new(ReqwestHttpClient::new()?);
    let config_store = Arc::new(JsonFileConfigStore::from_env());
    bootstrap(CoreDependencies::new(http_client, config_store), config).await
}
