//! Credential types shared by the manager, the share session and the connector.

use serde::Deserialize;
use std::fmt;

/// The two recoverable credential failures reported by the share API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// The bearer access token expired (`AccessTokenInvalid`)
    AccessToken,
    /// The share session expired or the share password is wrong (`ShareLinkTokenInvalid`)
    ShareToken,
}

impl CredentialKind {
    /// Map a share API error code to the credential it invalidates.
    ///
    /// Returns `None` for every other code; those are fatal for the call.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "AccessTokenInvalid" => Some(Self::AccessToken),
            "ShareLinkTokenInvalid" => Some(Self::ShareToken),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::AccessToken => "AccessTokenInvalid",
            Self::ShareToken => "ShareLinkTokenInvalid",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessToken => write!(f, "access token"),
            Self::ShareToken => write!(f, "share token"),
        }
    }
}

/// A token value tagged with the generation it was issued in.
///
/// The generation increases by one on every successful refresh. Callers
/// remember the generation they used so that a refresh triggered by a stale
/// failure can be skipped when someone else already refreshed.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Versioned {
    pub value: String,
    pub generation: u64,
}

impl Versioned {
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Debug for Versioned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Versioned")
            .field("value", &"[REDACTED]")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Credentials attached to one share API request.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizedRequest {
    pub access_token: Versioned,
    pub share_token: Versioned,
}

impl AuthorizedRequest {
    /// Generation of the credential `kind` this request was issued with.
    pub fn generation(&self, kind: CredentialKind) -> u64 {
        match kind {
            CredentialKind::AccessToken => self.access_token.generation,
            CredentialKind::ShareToken => self.share_token.generation,
        }
    }
}

impl fmt::Debug for AuthorizedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedRequest")
            .field("access_generation", &self.access_token.generation)
            .field("share_generation", &self.share_token.generation)
            .finish()
    }
}

/// Recoveries still allowed within one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    per_kind: u32,
    access_used: u32,
    share_used: u32,
}

impl RetryBudget {
    pub fn new(per_kind: u32) -> Self {
        Self {
            per_kind,
            access_used: 0,
            share_used: 0,
        }
    }

    /// Record one recovery of `kind`. Returns `false` when none is left.
    pub fn consume(&mut self, kind: CredentialKind) -> bool {
        let used = match kind {
            CredentialKind::AccessToken => &mut self.access_used,
            CredentialKind::ShareToken => &mut self.share_used,
        };
        if *used >= self.per_kind {
            return false;
        }
        *used += 1;
        true
    }

    pub fn used(&self, kind: CredentialKind) -> u32 {
        match kind {
            CredentialKind::AccessToken => self.access_used,
            CredentialKind::ShareToken => self.share_used,
        }
    }
}

/// Response of the account token endpoint.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Response of the share token endpoint.
#[derive(Deserialize)]
pub struct ShareTokenResponse {
    pub share_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl fmt::Debug for ShareTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareTokenResponse")
            .field("share_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Structured error body returned by the share API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl ApiErrorBody {
    /// Parse an error body; `None` when the body carries no error code.
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(body)
            .ok()
            .filter(|e| !e.code.is_empty())
    }
}
