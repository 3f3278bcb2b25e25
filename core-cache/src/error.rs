use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// Copying into the backing drive failed; nothing was cached.
    #[error("Failed to materialize {file_id}: {source}")]
    Materialization {
        file_id: String,
        #[source]
        source: BridgeError,
    },

    #[error("Failed to link materialized copy of {file_id}: {source}")]
    Link {
        file_id: String,
        #[source]
        source: BridgeError,
    },

    #[error("Materialization cache is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, CacheError>;
