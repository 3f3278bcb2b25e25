use crate::types::CredentialKind;
use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Share token request failed: {0}")]
    ShareTokenFailed(String),

    /// Recovery budget for this credential kind is spent.
    #[error("{kind} still rejected after {attempts} refresh attempt(s)")]
    CredentialExpired { kind: CredentialKind, attempts: u32 },

    #[error("No refresh token configured")]
    NoRefreshToken,

    #[error("Credential persistence failed: {0}")]
    Persistence(String),

    #[error("Network error: {0}")]
    Network(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
