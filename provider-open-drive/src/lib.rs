//! # Open Drive Provider
//!
//! Backing drive on the open platform API: the owned, writable drive that
//! receives materialized copies and serves their download links.
//!
//! ## Overview
//!
//! This module provides:
//! - OAuth refresh through a third-party token URL or the official endpoint
//! - Default drive discovery
//! - Four-hour download links
//! - Trash or permanent delete of copies, per `remove_way`

pub mod client;
pub mod error;

pub use client::{OpenDriveClient, OpenDriveConfig, OPEN_API_BASE};
pub use error::{OpenDriveError, Result};
