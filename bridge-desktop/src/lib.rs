//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (rustls, pooled, transport retries)
//! - `ConfigStore` writing the cache config as one JSON file
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{JsonFileConfigStore, ReqwestHttpClient};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let config_store = JsonFileConfigStore::from_env();
//! ```

mod config_store;
mod http;

pub use config_store::{JsonFileConfigStore, CONFIG_PATH_ENV};
pub use http::ReqwestHttpClient;
