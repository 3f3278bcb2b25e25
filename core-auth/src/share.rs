//! Per-share session: the share token plus the recovery policy for share API calls.

use crate::error::{AuthError, Result};
use crate::manager::CredentialManager;
use crate::types::{AuthorizedRequest, CredentialKind, RetryBudget, Versioned};
use core_runtime::events::{AuthEvent, CoreEvent};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// Authorizes requests against one share link.
///
/// The access token comes from the shared [`CredentialManager`]; the share
/// token is owned here because it is bound to `share_id` and `share_pwd`.
pub struct ShareSession {
    manager: Arc<CredentialManager>,
    share_id: String,
    share_pwd: Option<String>,
    share_token: RwLock<Versioned>,
    refresh_lock: Mutex<()>,
    retry_budget: u32,
}

impl fmt::Debug for ShareSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareSession")
            .field("share_id", &self.share_id)
            .field("has_share_pwd", &self.share_pwd.is_some())
            .field("retry_budget", &self.retry_budget)
            .finish()
    }
}

impl ShareSession {
    pub fn new(
        manager: Arc<CredentialManager>,
        share_id: impl Into<String>,
        share_pwd: Option<String>,
        retry_budget: u32,
    ) -> Self {
        Self {
            manager,
            share_id: share_id.into(),
            share_pwd: share_pwd.filter(|p| !p.is_empty()),
            share_token: RwLock::new(Versioned::default()),
            refresh_lock: Mutex::new(()),
            retry_budget,
        }
    }

    pub fn share_id(&self) -> &str {
        &self.share_id
    }

    pub fn manager(&self) -> &Arc<CredentialManager> {
        &self.manager
    }

    /// Fresh budget for one logical call.
    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(self.retry_budget)
    }

    pub async fn share_token(&self) -> Versioned {
        self.share_token.read().await.clone()
    }

    /// Share token for share-token-only endpoints, acquiring one if needed.
    pub async fn authorize_share(&self) -> Result<Versioned> {
        let current = self.share_token().await;
        if !current.is_empty() {
            return Ok(current);
        }
        self.refresh_share_token_after(current.generation).await
    }

    /// Both credentials for endpoints that need bearer and share token.
    pub async fn authorize(&self) -> Result<AuthorizedRequest> {
        let access_token = self.manager.ensure_access_token().await?;
        let share_token = self.authorize_share().await?;
        Ok(AuthorizedRequest {
            access_token,
            share_token,
        })
    }

    /// Re-acquire the share token unconditionally.
    pub async fn refresh_share_token(&self) -> Result<Versioned> {
        let _guard = self.refresh_lock.lock().await;
        self.acquire_share_token().await
    }

    /// Re-acquire the share token only if it is still at `observed_generation`.
    #[instrument(skip(self), fields(share_id = %self.share_id))]
    pub async fn refresh_share_token_after(&self, observed_generation: u64) -> Result<Versioned> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.share_token().await;
        if current.generation != observed_generation && !current.is_empty() {
            debug!(generation = current.generation, "Share token already refreshed");
            return Ok(current);
        }

        self.acquire_share_token().await
    }

    /// Caller must hold `refresh_lock`.
    async fn acquire_share_token(&self) -> Result<Versioned> {
        let response = match self
            .manager
            .token_client()
            .get_share_token(&self.share_id, self.share_pwd.as_deref())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(share_id = %self.share_id, error = %e, "Failed to get share token");
                let _ = self.manager.event_bus().emit(CoreEvent::Auth(AuthEvent::RefreshFailed {
                    credential: "share_token".to_string(),
                    message: e.to_string(),
                }));
                return Err(e);
            }
        };

        let refreshed = {
            let mut slot = self.share_token.write().await;
            slot.value = response.share_token;
            slot.generation += 1;
            slot.clone()
        };

        let _ = self
            .manager
            .event_bus()
            .emit(CoreEvent::Auth(AuthEvent::ShareTokenRefreshed {
                share_id: self.share_id.clone(),
                generation: refreshed.generation,
            }));

        info!(share_id = %self.share_id, generation = refreshed.generation, "Share token refreshed");
        Ok(refreshed)
    }

    /// Recover from a credential failure reported by the share API.
    ///
    /// `observed_generation` is the generation of the rejected credential.
    /// Returns `Ok(())` when the caller should retry, or
    /// [`AuthError::CredentialExpired`] once `budget` is spent for `kind`.
    pub async fn handle_auth_error(
        &self,
        kind: CredentialKind,
        observed_generation: u64,
        budget: &mut RetryBudget,
    ) -> Result<()> {
        if !budget.consume(kind) {
            warn!(share_id = %self.share_id, kind = %kind, "Credential recovery budget exhausted");
            return Err(AuthError::CredentialExpired {
                kind,
                attempts: budget.used(kind),
            });
        }

        debug!(share_id = %self.share_id, kind = %kind, "Recovering from credential failure");
        match kind {
            CredentialKind::AccessToken => {
                self.manager
                    .refresh_access_token_after(observed_generation)
                    .await?;
            }
            CredentialKind::ShareToken => {
                self.refresh_share_token_after(observed_generation).await?;
            }
        }
        Ok(())
    }
}
