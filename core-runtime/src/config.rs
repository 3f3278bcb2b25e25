//! # Configuration
//!
//! Two kinds of configuration live here:
//!
//! - [`ShareCacheConfig`]: the persisted JSON document shared by every driver
//!   instance. It carries the long-lived refresh tokens for both the share
//!   side and the backing drive, plus cache settings. It is rewritten as a
//!   whole on every credential change.
//! - [`DriverConfig`]: per-instance settings (which share to mount, listing
//!   order, refresh cadence, rate limits). Built with a fail-fast builder.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::DriverConfig;
//!
//! let config = DriverConfig::builder()
//!     .share_id("7JQX1FswpQ8")
//!     .share_pwd("1234")
//!     .order_by("name")
//!     .build()?;
//! ```
//!
//! A missing or unreadable cache document is not an error: it loads as
//! defaults with a warning, so a fresh install starts with empty credentials.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Token endpoint used by the backing drive when no client credentials are configured.
pub const DEFAULT_OAUTH_TOKEN_URL: &str = "https://api.nn.ci/alist/ali_open/token";

/// Maximum number of materialized copies kept when the document carries none.
pub const DEFAULT_MAX_TEMP_FILE_SIZE: u64 = 50;

const DEFAULT_ROOT_FOLDER_ID: &str = "root";
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);
const DEFAULT_LIST_MIN_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_LINK_MIN_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_EVICTION_QUEUE_CAPACITY: usize = 64;

/// How the backing drive disposes of evicted copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoveWay {
    /// Move to the recycle bin
    Trash,
    /// Delete permanently
    #[default]
    Delete,
}

impl<'de> Deserialize<'de> for RemoveWay {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Unknown values fall back to delete
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(match value.as_deref() {
            Some("trash") => RemoveWay::Trash,
            _ => RemoveWay::Delete,
        })
    }
}

/// Persisted cache config document.
///
/// Field names are the on-disk JSON keys. The short-lived share access token
/// is never written: only refresh tokens are persisted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareCacheConfig {
    pub shared_refresh_token: String,
    pub open_refresh_token: String,
    pub order_by: String,
    pub order_direction: String,
    pub oauth_token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub remove_way: RemoveWay,
    pub internal_upload: bool,
    pub temp_folder_id: String,
    pub max_temp_file_size: u64,
}

impl Default for ShareCacheConfig {
    fn default() -> Self {
        Self {
            shared_refresh_token: String::new(),
            open_refresh_token: String::new(),
            order_by: String::new(),
            order_direction: String::new(),
            oauth_token_url: DEFAULT_OAUTH_TOKEN_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            remove_way: RemoveWay::Delete,
            internal_upload: false,
            temp_folder_id: String::new(),
            max_temp_file_size: DEFAULT_MAX_TEMP_FILE_SIZE,
        }
    }
}

impl fmt::Debug for ShareCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareCacheConfig")
            .field("shared_refresh_token", &"[REDACTED]")
            .field("open_refresh_token", &"[REDACTED]")
            .field("order_by", &self.order_by)
            .field("order_direction", &self.order_direction)
            .field("oauth_token_url", &self.oauth_token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("remove_way", &self.remove_way)
            .field("internal_upload", &self.internal_upload)
            .field("temp_folder_id", &self.temp_folder_id)
            .field("max_temp_file_size", &self.max_temp_file_size)
            .finish()
    }
}

impl ShareCacheConfig {
    /// Parse a stored document, falling back to defaults when it is unusable.
    pub fn from_document(data: Option<&[u8]>) -> Self {
        let Some(data) = data else {
            warn!("No cache config document found, using defaults");
            return Self::default();
        };

        match serde_json::from_slice::<Self>(data) {
            Ok(config) => config.normalized(),
            Err(e) => {
                warn!(error = %e, "Cache config document is unreadable, using defaults");
                Self::default()
            }
        }
    }

    /// Serialize the whole document.
    pub fn to_document(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Re-apply defaults for fields stored as empty or zero.
    pub fn normalized(mut self) -> Self {
        if self.oauth_token_url.is_empty() {
            self.oauth_token_url = DEFAULT_OAUTH_TOKEN_URL.to_string();
        }
        if self.max_temp_file_size == 0 {
            self.max_temp_file_size = DEFAULT_MAX_TEMP_FILE_SIZE;
        }
        self
    }

    /// Whether the backing drive authenticates with its own client credentials.
    pub fn has_client_credentials(&self) -> bool {
        !self.client_id.is_empty()
    }
}

/// Per-instance driver configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Share link identifier
    pub share_id: String,
    /// Share password, when the link is protected
    pub share_pwd: Option<String>,
    /// Folder treated as the mount root
    pub root_folder_id: String,
    /// Listing sort field (`name`, `updated_at`, ...); empty lets the server decide
    pub order_by: String,
    /// `ASC` or `DESC`; empty lets the server decide
    pub order_direction: String,
    /// Period of the background credential refresh cycle
    pub refresh_interval: Duration,
    /// Credential recoveries allowed per error kind per logical call
    pub auth_retry_budget: u32,
    /// Minimum spacing between `list` calls; zero disables
    pub list_min_interval: Duration,
    /// Minimum spacing between `link` calls; zero disables
    pub link_min_interval: Duration,
    /// Pending eviction deletions before new ones are dropped
    pub eviction_queue_capacity: usize,
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("share_id", &self.share_id)
            .field("share_pwd", &self.share_pwd.as_ref().map(|_| "[REDACTED]"))
            .field("root_folder_id", &self.root_folder_id)
            .field("order_by", &self.order_by)
            .field("order_direction", &self.order_direction)
            .field("refresh_interval", &self.refresh_interval)
            .field("auth_retry_budget", &self.auth_retry_budget)
            .field("list_min_interval", &self.list_min_interval)
            .field("link_min_interval", &self.link_min_interval)
            .field("eviction_queue_capacity", &self.eviction_queue_capacity)
            .finish()
    }
}

impl DriverConfig {
    /// Creates a new builder.
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Share id is not empty
    /// - Refresh interval is non-zero
    /// - Eviction queue capacity is non-zero
    pub fn validate(&self) -> Result<()> {
        if self.share_id.trim().is_empty() {
            return Err(Error::Config("Share id cannot be empty".to_string()));
        }

        if self.root_folder_id.is_empty() {
            return Err(Error::Config("Root folder id cannot be empty".to_string()));
        }

        if self.refresh_interval.is_zero() {
            return Err(Error::Config(
                "Refresh interval must be greater than zero".to_string(),
            ));
        }

        if self.eviction_queue_capacity == 0 {
            return Err(Error::Config(
                "Eviction queue capacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`DriverConfig`].
#[derive(Default)]
pub struct DriverConfigBuilder {
    share_id: Option<String>,
    share_pwd: Option<String>,
    root_folder_id: Option<String>,
    order_by: Option<String>,
    order_direction: Option<String>,
    refresh_interval: Option<Duration>,
    auth_retry_budget: Option<u32>,
    list_min_interval: Option<Duration>,
    link_min_interval: Option<Duration>,
    eviction_queue_capacity: Option<usize>,
}

impl DriverConfigBuilder {
    pub fn share_id(mut self, share_id: impl Into<String>) -> Self {
        self.share_id = Some(share_id.into());
        self
    }

    /// Set the share password. An empty string means no password.
    pub fn share_pwd(mut self, share_pwd: impl Into<String>) -> Self {
        let pwd = share_pwd.into();
        self.share_pwd = (!pwd.is_empty()).then_some(pwd);
        self
    }

    pub fn root_folder_id(mut self, id: impl Into<String>) -> Self {
        self.root_folder_id = Some(id.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn order_direction(mut self, direction: impl Into<String>) -> Self {
        self.order_direction = Some(direction.into());
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn auth_retry_budget(mut self, budget: u32) -> Self {
        self.auth_retry_budget = Some(budget);
        self
    }

    pub fn list_min_interval(mut self, interval: Duration) -> Self {
        self.list_min_interval = Some(interval);
        self
    }

    pub fn link_min_interval(mut self, interval: Duration) -> Self {
        self.link_min_interval = Some(interval);
        self
    }

    pub fn eviction_queue_capacity(mut self, capacity: usize) -> Self {
        self.eviction_queue_capacity = Some(capacity);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<DriverConfig> {
        let share_id = self.share_id.ok_or_else(|| {
            Error::Config("Share id is required. Use .share_id() to set it.".to_string())
        })?;

        let config = DriverConfig {
            share_id,
            share_pwd: self.share_pwd,
            root_folder_id: self
                .root_folder_id
                .unwrap_or_else(|| DEFAULT_ROOT_FOLDER_ID.to_string()),
            order_by: self.order_by.unwrap_or_default(),
            order_direction: self.order_direction.unwrap_or_default(),
            refresh_interval: self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL),
            auth_retry_budget: self.auth_retry_budget.unwrap_or(1),
            list_min_interval: self.list_min_interval.unwrap_or(DEFAULT_LIST_MIN_INTERVAL),
            link_min_interval: self.link_min_interval.unwrap_or(DEFAULT_LINK_MIN_INTERVAL),
            eviction_queue_capacity: self
                .eviction_queue_capacity
                .unwrap_or(DEFAULT_EVICTION_QUEUE_CAPACITY),
        };

        config.validate()?;

        Ok(config)
    }
}
