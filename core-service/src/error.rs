use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Driver is shut down")]
    ShutDown,

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),

    #[error(transparent)]
    Share(#[from] provider_share_drive::ShareDriveError),

    #[error(transparent)]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
