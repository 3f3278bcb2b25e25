//! Backing Drive Boundary
//!
//! The backing drive is the writable drive owned by the service account.
//! Shared files are copied ("materialized") into it so that stable download
//! links can be produced from a drive the caller controls.
//!
//! Two views of it exist:
//!
//! - [`BackingDrive`]: the drive itself. It owns its OAuth session, knows its
//!   own drive id and can link or remove files it owns.
//! - [`BackingAdapter`]: the three calls the materialization cache makes.
//!   `copy_into` is performed under the share credentials, so the adapter is
//!   usually a composition of the share connector and a `BackingDrive`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Destination-side identity of a materialized copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterializedHandle {
    pub file_id: String,
    pub domain_id: String,
    pub drive_id: String,
    pub name: String,
}

/// Time-limited download link for a file on the backing drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub url: String,
    /// Headers the downloader must send (e.g. `Referer`).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl DownloadLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// The owned, writable drive used as materialization destination.
///
/// Retry and token refresh semantics are internal to the implementation.
#[async_trait]
pub trait BackingDrive: Send + Sync {
    /// Drive id copies must target. `None` until the drive has been initialized
    /// or a later credential refresh has discovered it.
    async fn drive_id(&self) -> Option<String>;

    /// Produce a download link for a file the drive owns.
    async fn link(&self, handle: &MaterializedHandle) -> Result<DownloadLink>;

    /// Delete (or trash) a file the drive owns.
    async fn remove(&self, handle: &MaterializedHandle) -> Result<()>;

    /// Proactively refresh the drive's own OAuth session.
    ///
    /// A drive whose id is still unknown looks it up again afterwards.
    async fn refresh_credentials(&self) -> Result<()>;

    /// Current refresh token, surfaced only so it can be persisted.
    async fn refresh_token(&self) -> Option<String>;
}

/// Receives the backing drive's refresh token each time it rotates.
///
/// Rotations happen on proactive refreshes and on refreshes the drive makes
/// by itself after a rejected request.
#[async_trait]
pub trait RefreshTokenSink: Send + Sync {
    async fn refresh_token_rotated(&self, refresh_token: &str);
}

/// Narrow contract consumed by the materialization cache.
#[async_trait]
pub trait BackingAdapter: Send + Sync {
    /// Copy the shared file `source_file_id` into the backing drive.
    async fn copy_into(&self, source_file_id: &str, name: &str) -> Result<MaterializedHandle>;

    /// Download link for a materialized copy.
    async fn link(&self, handle: &MaterializedHandle) -> Result<DownloadLink>;

    /// Delete a materialized copy.
    async fn remove(&self, handle: &MaterializedHandle) -> Result<()>;
}
