//! Shared library for the catalog client workspace.
//!
//! This crate provides functionality used by the client crate and by hosts
//! embedding it:
//! - Configuration management
//! - Catalog item models
//! - Logging infrastructure

pub mod config;
pub mod logging;
pub mod models;

// Re-export commonly used types
pub use config::{Config, LoggingConfig, MalConfig};
pub use logging::LogConfig;
pub use models::*;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
