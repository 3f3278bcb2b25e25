//! # Authentication Module
//!
//! Credential lifecycle for share link access.
//!
//! ## Overview
//!
//! Share API calls carry two independent credentials:
//!
//! - a bearer **access token**, derived from the shared refresh token kept in
//!   the cache config document ([`CredentialManager`]);
//! - a **share token**, bound to one share id and optional password
//!   ([`ShareSession`]).
//!
//! Either can expire on its own. The share API reports `AccessTokenInvalid`
//! or `ShareLinkTokenInvalid`; [`ShareSession::handle_auth_error`] refreshes
//! the matching credential within a per-call [`RetryBudget`] and reports
//! [`AuthError::CredentialExpired`] once the budget is spent.
//!
//! ## Features
//!
//! - Generation-tagged tokens so concurrent failures trigger one refresh
//! - Whole-document persistence of rotated refresh tokens
//! - Periodic refresh cycle for both share and backing credentials
//! - Auth event emission

pub mod error;
pub mod manager;
pub mod share;
pub mod token_client;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::CredentialManager;
pub use share::ShareSession;
pub use token_client::{TokenClient, TokenEndpoints};
pub use token_store::TokenStore;
pub use types::{AuthorizedRequest, CredentialKind, RetryBudget, Versioned};
