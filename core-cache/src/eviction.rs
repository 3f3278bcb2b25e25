//! Background deletion of evicted copies.
//!
//! Evictions hand their handle to a bounded queue consumed by a single
//! worker task. Scheduling never waits: when the queue is full the deletion
//! is dropped and the copy stays orphaned on the backing drive. Delete
//! failures are logged once and never retried. [`EvictionWorker::shutdown`]
//! closes the queue and waits until every queued deletion has been attempted.

use bridge_traits::backing::{BackingAdapter, MaterializedHandle};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct EvictionWorker {
    sender: Mutex<Option<mpsc::Sender<MaterializedHandle>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    event_bus: Option<EventBus>,
}

impl EvictionWorker {
    /// Spawn the worker on the current Tokio runtime.
    pub fn spawn(
        adapter: Arc<dyn BackingAdapter>,
        capacity: usize,
        event_bus: Option<EventBus>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(Self::run(adapter, receiver, event_bus.clone()));

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            event_bus,
        }
    }

    async fn run(
        adapter: Arc<dyn BackingAdapter>,
        mut receiver: mpsc::Receiver<MaterializedHandle>,
        event_bus: Option<EventBus>,
    ) {
        while let Some(handle) = receiver.recv().await {
            debug!(file_id = %handle.file_id, name = %handle.name, "Deleting evicted copy");
            match adapter.remove(&handle).await {
                Ok(()) => info!(file_id = %handle.file_id, "Evicted copy deleted"),
                Err(e) => {
                    error!(file_id = %handle.file_id, name = %handle.name, error = %e, "Failed to delete evicted copy");
                    if let Some(bus) = &event_bus {
                        let _ = bus.emit(CoreEvent::Cache(CacheEvent::EvictionDeleteFailed {
                            copy_file_id: handle.file_id.clone(),
                            message: e.to_string(),
                        }));
                    }
                }
            }
        }
        debug!("Eviction worker drained");
    }

    /// Queue `handle` for deletion without waiting.
    ///
    /// Returns `false` when the deletion was dropped.
    pub async fn schedule(&self, handle: MaterializedHandle) -> bool {
        let sender = self.sender.lock().await;
        let Some(sender) = sender.as_ref() else {
            warn!(file_id = %handle.file_id, "Eviction worker stopped, leaving copy orphaned");
            return false;
        };

        match sender.try_send(handle) {
            Ok(()) => true,
            Err(TrySendError::Full(handle)) => {
                error!(file_id = %handle.file_id, "Eviction queue full, leaving copy orphaned");
                if let Some(bus) = &self.event_bus {
                    let _ = bus.emit(CoreEvent::Cache(CacheEvent::EvictionDropped {
                        copy_file_id: handle.file_id,
                    }));
                }
                false
            }
            Err(TrySendError::Closed(handle)) => {
                error!(file_id = %handle.file_id, "Eviction worker gone, leaving copy orphaned");
                false
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.sender.lock().await.is_some()
    }

    /// Close the queue and wait for pending deletions. Idempotent.
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Eviction worker ended abnormally");
            }
        }
    }
}
