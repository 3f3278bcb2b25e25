//! Backing adapter used by the materialization cache.
//!
//! Copies run on the share side (they need the share credentials); links
//! and removals run on the backing drive that owns the copies.

use async_trait::async_trait;
use bridge_traits::backing::{BackingAdapter, BackingDrive, DownloadLink, MaterializedHandle};
use bridge_traits::error::{BridgeError, Result};
use provider_share_drive::ShareDriveConnector;
use std::sync::Arc;

pub struct ShareBackingAdapter {
    connector: Arc<ShareDriveConnector>,
    backing: Arc<dyn BackingDrive>,
    temp_folder_id: String,
}

impl ShareBackingAdapter {
    /// Copies land in `temp_folder_id` on the backing drive.
    pub fn new(
        connector: Arc<ShareDriveConnector>,
        backing: Arc<dyn BackingDrive>,
        temp_folder_id: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            backing,
            temp_folder_id: temp_folder_id.into(),
        }
    }

    pub fn temp_folder_id(&self) -> &str {
        &self.temp_folder_id
    }
}

#[async_trait]
impl BackingAdapter for ShareBackingAdapter {
    async fn copy_into(&self, source_file_id: &str, name: &str) -> Result<MaterializedHandle> {
        let drive_id = self.backing.drive_id().await.ok_or_else(|| {
            BridgeError::NotAvailable("Backing drive id unknown, drive not initialized".to_string())
        })?;

        self.connector
            .copy_to_drive(source_file_id, name, &self.temp_folder_id, &drive_id)
            .await
            .map_err(BridgeError::from)
    }

    async fn link(&self, handle: &MaterializedHandle) -> Result<DownloadLink> {
        self.backing.link(handle).await
    }

    async fn remove(&self, handle: &MaterializedHandle) -> Result<()> {
        self.backing.remove(handle).await
    }
}
