//! Error types for the share API connector

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

/// Share API connector errors
#[derive(Error, Debug)]
pub enum ShareDriveError {
    /// The bearer access token was rejected (`AccessTokenInvalid`)
    #[error("Share access token is invalid")]
    AccessTokenInvalid,

    /// The share session expired or the password is wrong (`ShareLinkTokenInvalid`)
    #[error("Share link token is invalid")]
    ShareLinkTokenInvalid,

    /// Any other structured error returned by the share API
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    /// The batch copy reported a non-success item status.
    ///
    /// `status` is 0 when the batch came back without any item.
    #[error("Failed to copy shared file {file_id} (item status {status})")]
    MaterializationFailed { file_id: String, status: u16 },

    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Credential recovery failed or its budget is spent
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for share API operations
pub type Result<T> = std::result::Result<T, ShareDriveError>;

impl ShareDriveError {
    /// Classify an error code returned by the share API.
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        match code.as_str() {
            "AccessTokenInvalid" => Self::AccessTokenInvalid,
            "ShareLinkTokenInvalid" => Self::ShareLinkTokenInvalid,
            _ => Self::Api {
                code,
                message: message.into(),
            },
        }
    }

    /// Whether refreshing a credential may make the call succeed.
    pub fn is_credential_expired(&self) -> bool {
        matches!(self, Self::AccessTokenInvalid | Self::ShareLinkTokenInvalid)
    }
}

impl From<ShareDriveError> for BridgeError {
    fn from(error: ShareDriveError) -> Self {
        match error {
            ShareDriveError::MaterializationFailed { file_id, status } => BridgeError::Remote {
                status,
                message: format!("Failed to copy shared file {}", file_id),
            },
            ShareDriveError::UnsupportedOperation(method) => {
                BridgeError::NotAvailable(format!("Operation not supported: {}", method))
            }
            ShareDriveError::Auth(AuthError::Network(e)) => e,
            ShareDriveError::Bridge(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
