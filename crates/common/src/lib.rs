//! vbr Common Utilities
//!
//! Shared infrastructure for all vbr crates:
//! - Error types and result aliases
//! - Tracing/logging initialization
//! - Configuration loading (binary paths, timeouts, logging)

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
