//! # Host Bridge Traits
//!
//! Contracts between the share-drive core and the components it treats as
//! external collaborators.
//!
//! ## Overview
//!
//! The core never talks to the network, the filesystem or the owned backing
//! drive directly. Each of those capabilities sits behind a trait defined here
//! so that the desktop crate (or a test double) can supply it.
//!
//! ## Traits
//!
//! ### Transport & persistence
//! - [`HttpClient`](http::HttpClient) - Async HTTP request/response transport
//! - [`ConfigStore`](storage::ConfigStore) - Whole-document persistence of the cache config
//!
//! ### Backing drive
//! - [`BackingDrive`](backing::BackingDrive) - The owned, writable drive (link, remove, identity)
//! - [`BackingAdapter`](backing::BackingAdapter) - The narrow copy/link/remove view consumed by the cache
//! - [`RefreshTokenSink`](backing::RefreshTokenSink) - Where the backing drive reports rotated refresh tokens
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Injectable "now" for link expiry
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert their own failures into it and keep the remote status/message so
//! callers can surface it verbatim.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; implementations are shared through
//! `Arc<dyn Trait>` across tasks.

pub mod backing;
pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use backing::{
    BackingAdapter, BackingDrive, DownloadLink, MaterializedHandle, RefreshTokenSink,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use storage::ConfigStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
