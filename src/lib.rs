//! Workspace façade crate.
//!
//! Exposes the share-drive driver through a single dependency. Hosts enable
//! `desktop-shims` (the default) to get the reqwest HTTP client and the JSON
//! file config store wired in by `core-service`.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
