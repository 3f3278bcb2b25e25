//! # Credential Manager
//!
//! Owns the account-level share credentials: the shared refresh token (kept in
//! the cache config document) and the bearer access token derived from it.
//!
//! ## Overview
//!
//! - Exchanges the refresh token for an access token on demand
//! - Coalesces concurrent refreshes: a caller that observed generation `n`
//!   only triggers a network refresh if the token is still at generation `n`
//! - Persists the whole config document after every successful refresh,
//!   including the backing drive's current refresh token
//! - Runs a periodic refresh cycle that also refreshes the backing drive and
//!   persists its rotated refresh token even when the share side then fails
//!
//! One manager is shared (`Arc`) by every [`ShareSession`](crate::ShareSession)
//! that reads the same config document.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{CredentialManager, TokenClient, TokenStore};
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//! use std::time::Duration;
//! # use bridge_traits::{ConfigStore, HttpClient};
//! # async fn example(http: Arc<dyn HttpClient>, config: Arc<dyn ConfigStore>) -> core_auth::Result<()> {
//! let store = TokenStore::load(config).await;
//! let manager = Arc::new(CredentialManager::new(TokenClient::new(http), store, EventBus::default()));
//!
//! manager.ensure_access_token().await?;
//! let cycle = manager.start_refresh_cycle(Duration::from_secs(2 * 60 * 60));
//! # cycle.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::token_client::TokenClient;
use crate::token_store::TokenStore;
use crate::types::Versioned;
use bridge_traits::BackingDrive;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::schedule::PeriodicTask;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

pub struct CredentialManager {
    token_client: TokenClient,
    token_store: TokenStore,
    backing: Option<Arc<dyn BackingDrive>>,
    event_bus: EventBus,
    access_token: RwLock<Versioned>,
    /// Serializes network refreshes of the access token
    refresh_lock: Mutex<()>,
}

impl CredentialManager {
    pub fn new(token_client: TokenClient, token_store: TokenStore, event_bus: EventBus) -> Self {
        Self {
            token_client,
            token_store,
            backing: None,
            event_bus,
            access_token: RwLock::new(Versioned::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Attach the backing drive whose refresh token is persisted alongside ours.
    pub fn with_backing(mut self, backing: Arc<dyn BackingDrive>) -> Self {
        self.backing = Some(backing);
        self
    }

    pub fn token_client(&self) -> &TokenClient {
        &self.token_client
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.token_store
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Current access token; empty until the first refresh.
    pub async fn access_token(&self) -> Versioned {
        self.access_token.read().await.clone()
    }

    /// Return the access token, refreshing first if none is held yet.
    pub async fn ensure_access_token(&self) -> Result<Versioned> {
        let current = self.access_token().await;
        if !current.is_empty() {
            return Ok(current);
        }
        self.refresh_access_token_after(current.generation).await
    }

    /// Refresh unconditionally.
    pub async fn refresh_access_token(&self) -> Result<Versioned> {
        let _guard = self.refresh_lock.lock().await;
        self.exchange_refresh_token().await
    }

    /// Refresh only if the token is still at `observed_generation`.
    ///
    /// Callers that failed with a token another task already replaced get the
    /// replacement without a second network exchange.
    #[instrument(skip(self))]
    pub async fn refresh_access_token_after(&self, observed_generation: u64) -> Result<Versioned> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.access_token().await;
        if current.generation != observed_generation && !current.is_empty() {
            debug!(
                generation = current.generation,
                "Access token already refreshed by another task"
            );
            return Ok(current);
        }

        self.exchange_refresh_token().await
    }

    /// Caller must hold `refresh_lock`.
    async fn exchange_refresh_token(&self) -> Result<Versioned> {
        let refresh_token = self.token_store.shared_refresh_token().await;

        let tokens = match self.token_client.refresh_access_token(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(error = %e, "Failed to refresh share access token");
                let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::RefreshFailed {
                    credential: "access_token".to_string(),
                    message: e.to_string(),
                }));
                return Err(e);
            }
        };

        let refreshed = {
            let mut slot = self.access_token.write().await;
            slot.value = tokens.access_token;
            slot.generation += 1;
            slot.clone()
        };

        let rotated = tokens.refresh_token.unwrap_or(refresh_token);
        self.persist(&rotated).await;

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AccessTokenRefreshed {
            generation: refreshed.generation,
        }));

        info!(generation = refreshed.generation, "Share access token refreshed");
        Ok(refreshed)
    }

    /// A failed write is logged; the in-memory tokens stay valid.
    async fn persist(&self, shared_refresh_token: &str) {
        let open_refresh_token = match &self.backing {
            Some(backing) => backing.refresh_token().await,
            None => None,
        };

        if let Err(e) = self
            .token_store
            .store_refresh_tokens(shared_refresh_token, open_refresh_token.as_deref())
            .await
        {
            error!(error = %e, "Failed to save cache config");
        }
    }

    /// Save the backing drive's current refresh token on its own.
    async fn persist_backing(&self, backing: &dyn BackingDrive) {
        let Some(open_refresh_token) = backing.refresh_token().await else {
            return;
        };
        if let Err(e) = self
            .token_store
            .store_open_refresh_token(&open_refresh_token)
            .await
        {
            error!(error = %e, "Failed to save backing refresh token");
        }
    }

    /// One pass of the periodic cycle: backing drive first, then our token.
    ///
    /// A backing failure is logged and does not skip the share-side refresh.
    pub async fn run_refresh_cycle(&self) -> Result<()> {
        if let Some(backing) = &self.backing {
            match backing.refresh_credentials().await {
                Ok(()) => {
                    self.persist_backing(backing.as_ref()).await;
                    let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::BackingRefreshed));
                }
                Err(e) => {
                    warn!(error = %e, "Backing drive refresh failed");
                    let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::RefreshFailed {
                        credential: "backing".to_string(),
                        message: e.to_string(),
                    }));
                }
            }
        }

        self.refresh_access_token().await.map(|_| ())
    }

    /// Spawn the periodic refresh cycle. Stop it with [`PeriodicTask::stop`].
    pub fn start_refresh_cycle(self: &Arc<Self>, interval: Duration) -> PeriodicTask {
        let manager = Arc::clone(self);
        info!(interval_secs = interval.as_secs(), "Starting credential refresh cycle");
        PeriodicTask::spawn("credential-refresh", interval, move || {
            let manager = Arc::clone(&manager);
            async move { manager.run_refresh_cycle().await }
        })
    }
}
