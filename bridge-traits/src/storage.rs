//! Config Document Persistence
//!
//! The share cache keeps one small JSON document (credentials plus cache
//! settings). Reading and writing it is the host's job; the core only hands
//! over the serialized bytes.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Whole-document config persistence.
///
/// Implementations MUST:
/// - Replace the previous document atomically (no partially written files)
/// - Never log the document contents (it carries refresh tokens)
///
/// Concurrent writers are not reconciled; the last `save` wins.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ConfigStore;
///
/// async fn persist(store: &dyn ConfigStore, doc: &serde_json::Value) -> Result<()> {
///     store.save(serde_json::to_vec(doc)?.into()).await
/// }
/// ```
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the current document.
    ///
    /// Returns `Ok(None)` when nothing has been persisted yet.
    async fn load(&self) -> Result<Option<Bytes>>;

    /// Overwrite the document with `data`.
    async fn save(&self, data: Bytes) -> Result<()>;

    /// Human-readable location, used in log lines.
    fn location(&self) -> String;
}
