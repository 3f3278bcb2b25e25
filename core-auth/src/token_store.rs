//! Credential Persistence
//!
//! Refresh tokens for both the share side and the backing drive live in the
//! same cache config document. Every write replaces the whole document; the
//! last writer wins.
//!
//! ## Security
//!
//! - Token values are never logged
//! - The short-lived share access token is never written to disk
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::TokenStore;
//! use std::sync::Arc;
//! # use bridge_traits::storage::ConfigStore;
//! # async fn example(config_store: Arc<dyn ConfigStore>) -> core_auth::Result<()> {
//! let store = TokenStore::load(config_store).await;
//! let refresh_token = store.document().await.shared_refresh_token;
//!
//! store.store_refresh_tokens("rotated-share-token", Some("rotated-open-token")).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use async_trait::async_trait;
use bridge_traits::backing::RefreshTokenSink;
use bridge_traits::storage::ConfigStore;
use bytes::Bytes;
use core_runtime::config::ShareCacheConfig;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// In-memory copy of the cache config document plus its backing store.
#[derive(Clone)]
pub struct TokenStore {
    config_store: Arc<dyn ConfigStore>,
    document: Arc<Mutex<ShareCacheConfig>>,
}

impl TokenStore {
    /// Read the document, tolerating a missing or unreadable one.
    pub async fn load(config_store: Arc<dyn ConfigStore>) -> Self {
        let location = config_store.location();
        let raw = match config_store.load().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(location = %location, error = %e, "Failed to read cache config");
                None
            }
        };

        let document = ShareCacheConfig::from_document(raw.as_deref());
        info!(
            location = %location,
            has_shared_refresh_token = !document.shared_refresh_token.is_empty(),
            has_open_refresh_token = !document.open_refresh_token.is_empty(),
            "Cache config loaded"
        );

        Self::with_document(config_store, document)
    }

    /// Start from an already parsed document.
    pub fn with_document(config_store: Arc<dyn ConfigStore>, document: ShareCacheConfig) -> Self {
        Self {
            config_store,
            document: Arc::new(Mutex::new(document)),
        }
    }

    /// Snapshot of the current document.
    pub async fn document(&self) -> ShareCacheConfig {
        self.document.lock().await.clone()
    }

    pub async fn shared_refresh_token(&self) -> String {
        self.document.lock().await.shared_refresh_token.clone()
    }

    /// Record rotated refresh tokens and rewrite the whole document.
    ///
    /// `open_refresh_token` is left unchanged when `None`.
    pub async fn store_refresh_tokens(
        &self,
        shared_refresh_token: &str,
        open_refresh_token: Option<&str>,
    ) -> Result<()> {
        let mut document = self.document.lock().await;
        document.shared_refresh_token = shared_refresh_token.to_string();
        if let Some(open) = open_refresh_token.filter(|t| !t.is_empty()) {
            document.open_refresh_token = open.to_string();
        }
        self.save(document).await
    }

    /// Record the backing drive's refresh token alone.
    ///
    /// Returns `false` without writing when the token is empty or unchanged.
    pub async fn store_open_refresh_token(&self, open_refresh_token: &str) -> Result<bool> {
        let mut document = self.document.lock().await;
        if open_refresh_token.is_empty() || document.open_refresh_token == open_refresh_token {
            return Ok(false);
        }
        document.open_refresh_token = open_refresh_token.to_string();
        self.save(document).await?;
        Ok(true)
    }

    /// Write the locked document; the lock is released only after the save.
    async fn save(&self, document: MutexGuard<'_, ShareCacheConfig>) -> Result<()> {
        let data = document
            .to_document()
            .map_err(|e| AuthError::Persistence(e.to_string()))?;

        self.config_store
            .save(Bytes::from(data))
            .await
            .map_err(|e| AuthError::Persistence(e.to_string()))?;

        debug!(location = %self.config_store.location(), "Credentials persisted");
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenSink for TokenStore {
    async fn refresh_token_rotated(&self, refresh_token: &str) {
        if let Err(e) = self.store_open_refresh_token(refresh_token).await {
            error!(error = %e, "Failed to save rotated backing refresh token");
        }
    }
}
