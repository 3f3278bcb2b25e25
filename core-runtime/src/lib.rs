//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the share drive core:
//! - Logging and tracing infrastructure
//! - Persisted cache config document and driver configuration
//! - Event bus system
//! - Periodic task scheduling
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the auth, cache, provider
//! and service crates depend on. It establishes the logging conventions,
//! configuration validation and event broadcasting used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod schedule;

pub use error::{Error, Result};
