use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenDriveError {
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error("Open drive access token is invalid")]
    AccessTokenInvalid,

    #[error("Token endpoint returned an empty token")]
    EmptyToken,

    #[error("Drive id unknown, the drive has not been initialized")]
    NoDriveId,

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, OpenDriveError>;

impl From<OpenDriveError> for BridgeError {
    fn from(error: OpenDriveError) -> Self {
        match error {
            OpenDriveError::Bridge(e) => e,
            OpenDriveError::NoDriveId => BridgeError::NotAvailable(error.to_string()),
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
