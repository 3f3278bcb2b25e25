//! JSON file config store using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::ConfigStore,
};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Environment variable overriding the config document location.
pub const CONFIG_PATH_ENV: &str = "CACHE_CONFIG_PATH";

/// Stores the cache config document as a single JSON file.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a reader never observes a half-written document.
pub struct JsonFileConfigStore {
    path: PathBuf,
}

impl JsonFileConfigStore {
    /// Store at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$CACHE_CONFIG_PATH`, or `<data dir>/share-drive/cache.json`
    pub fn from_env() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_path);
        info!(path = %path.display(), "Using cache config file");
        Self { path }
    }

    fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join("share-drive")
            .join("cache.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cache.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConfigStore for JsonFileConfigStore {
    async fn load(&self) -> Result<Option<Bytes>> {
        match fs::read(&self.path).await {
            Ok(data) => {
                debug!(path = %self.path.display(), bytes = data.len(), "Loaded config document");
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn save(&self, data: Bytes) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = data.len(), "Saved config document");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
