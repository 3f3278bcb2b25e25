//! Materialization cache.
//!
//! Shared files cannot be linked directly; they are copied into the backing
//! drive first. [`MaterializationCache`] remembers those copies, bounded by a
//! strict FIFO [`RetentionWindow`], and deletes evicted copies in the
//! background through an [`EvictionWorker`].

pub mod error;
pub mod eviction;
pub mod materialize;
pub mod window;

pub use error::{CacheError, Result};
pub use eviction::EvictionWorker;
pub use materialize::MaterializationCache;
pub use window::RetentionWindow;
