//! # Share Drive Provider
//!
//! Connector for the share-link API of the drive.
//!
//! ## Overview
//!
//! This module provides:
//! - Paginated directory listing authorized by the share token
//! - Server-side copy of a shared file into the backing drive
//! - Document and video preview proxying
//! - Refresh-and-retry on `AccessTokenInvalid` / `ShareLinkTokenInvalid`
//!   within a bounded budget

pub mod connector;
pub mod error;
pub mod types;

pub use connector::ShareDriveConnector;
pub use error::{Result, ShareDriveError};
pub use types::{FileKind, ShareFile};
