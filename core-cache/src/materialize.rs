//! # Materialization Cache
//!
//! Maps a share-side file id to the copy made of it in the backing drive.
//!
//! ## Overview
//!
//! `resolve_link` serves a download link for a shared file:
//!
//! 1. **Hit**: the file already has a copy; ask the adapter for a link.
//! 2. **Miss**: copy the file into the backing drive, record the copy at the
//!    tail of the retention window, evict from the head while the window
//!    holds more than `max_entries`, then link the new copy.
//!
//! ## Concurrency
//!
//! Misses for the same file id are serialized by a per-key lock, so a file
//! is copied at most once while its entry is live. The second caller waits
//! for the first and then finds the entry. Misses for different ids copy in
//! parallel. The window itself sits behind one mutex held only for
//! `get`/`put_if_absent`/evict, never across a network call.
//!
//! Evicted entries are removed synchronously; deleting the copy is handed to
//! the [`EvictionWorker`] and never fails the caller.

use crate::error::{CacheError, Result};
use crate::eviction::EvictionWorker;
use crate::window::RetentionWindow;
use bridge_traits::backing::{BackingAdapter, DownloadLink, MaterializedHandle};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

type KeyLocks = Mutex<HashMap<String, Arc<Mutex<()>>>>;

pub struct MaterializationCache {
    adapter: Arc<dyn BackingAdapter>,
    max_entries: usize,
    window: Mutex<RetentionWindow<String, MaterializedHandle>>,
    key_locks: KeyLocks,
    eviction: EvictionWorker,
    event_bus: Option<EventBus>,
    closed: AtomicBool,
}

impl MaterializationCache {
    /// Create a cache holding at most `max_entries` copies.
    ///
    /// Spawns the eviction worker, so this must run inside a Tokio runtime.
    pub fn new(
        adapter: Arc<dyn BackingAdapter>,
        max_entries: usize,
        eviction_queue_capacity: usize,
        event_bus: Option<EventBus>,
    ) -> Self {
        let eviction = EvictionWorker::spawn(
            Arc::clone(&adapter),
            eviction_queue_capacity,
            event_bus.clone(),
        );

        Self {
            adapter,
            max_entries: max_entries.max(1),
            window: Mutex::new(RetentionWindow::new()),
            key_locks: Mutex::new(HashMap::new()),
            eviction,
            event_bus,
            closed: AtomicBool::new(false),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub async fn len(&self) -> usize {
        self.window.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.window.lock().await.is_empty()
    }

    pub async fn contains(&self, source_file_id: &str) -> bool {
        self.window.lock().await.contains(&source_file_id.to_string())
    }

    /// Source ids from oldest to newest.
    pub async fn keys(&self) -> Vec<String> {
        self.window.lock().await.keys().cloned().collect()
    }

    /// Download link for the shared file `source_file_id`, materializing it first if needed.
    #[instrument(skip(self), fields(max_entries = self.max_entries))]
    pub async fn resolve_link(&self, source_file_id: &str, name: &str) -> Result<DownloadLink> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::ShuttingDown);
        }

        if let Some(handle) = self.lookup(source_file_id).await {
            return self.link(source_file_id, &handle).await;
        }

        let key_lock = self.key_lock(source_file_id).await;
        let materialized = {
            let _guard = key_lock.lock().await;
            self.materialize(source_file_id, name).await
        };
        self.release_key_lock(source_file_id, key_lock).await;

        let handle = materialized?;
        self.link(source_file_id, &handle).await
    }

    async fn lookup(&self, source_file_id: &str) -> Option<MaterializedHandle> {
        let handle = self
            .window
            .lock()
            .await
            .get(&source_file_id.to_string())
            .cloned()?;

        info!(file_id = %source_file_id, copy_id = %handle.file_id, "File in cache, reusing copy");
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Cache(CacheEvent::CacheHit {
                source_file_id: source_file_id.to_string(),
            }));
        }
        Some(handle)
    }

    /// Caller must hold the key lock for `source_file_id`.
    async fn materialize(&self, source_file_id: &str, name: &str) -> Result<MaterializedHandle> {
        // Another caller may have finished while we waited for the key lock
        if let Some(handle) = self.lookup(source_file_id).await {
            return Ok(handle);
        }

        info!(file_id = %source_file_id, name = %name, "Materializing shared file");
        let handle = self
            .adapter
            .copy_into(source_file_id, name)
            .await
            .map_err(|source| {
                error!(file_id = %source_file_id, name = %name, error = %source, "Failed to materialize shared file");
                CacheError::Materialization {
                    file_id: source_file_id.to_string(),
                    source,
                }
            })?;

        let evicted = {
            let mut window = self.window.lock().await;
            window.put_if_absent(source_file_id.to_string(), handle.clone());
            window.evict_over(self.max_entries)
        };

        info!(file_id = %source_file_id, copy_id = %handle.file_id, "Shared file materialized");
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Cache(CacheEvent::Materialized {
                source_file_id: source_file_id.to_string(),
                copy_file_id: handle.file_id.clone(),
            }));
        }

        for (evicted_id, evicted_handle) in evicted {
            debug!(file_id = %evicted_id, copy_id = %evicted_handle.file_id, "Evicting oldest copy");
            if let Some(bus) = &self.event_bus {
                let _ = bus.emit(CoreEvent::Cache(CacheEvent::Evicted {
                    source_file_id: evicted_id,
                    copy_file_id: evicted_handle.file_id.clone(),
                }));
            }
            self.eviction.schedule(evicted_handle).await;
        }

        Ok(handle)
    }

    async fn link(&self, source_file_id: &str, handle: &MaterializedHandle) -> Result<DownloadLink> {
        self.adapter
            .link(handle)
            .await
            .map_err(|source| CacheError::Link {
                file_id: source_file_id.to_string(),
                source,
            })
    }

    async fn key_lock(&self, source_file_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(source_file_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_key_lock(&self, source_file_id: &str, key_lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().await;
        // Only the map and this caller still hold it
        if Arc::strong_count(&key_lock) == 2 {
            locks.remove(source_file_id);
        }
    }

    /// Stop accepting resolves and wait for queued deletions.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down materialization cache");
        self.eviction.shutdown().await;
    }
}
