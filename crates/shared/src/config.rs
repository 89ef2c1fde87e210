//! Configuration management for the catalog client.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use crate::logging::LogConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Catalog service settings
    #[serde(default)]
    pub mal: MalConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log directory path
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// Catalog service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MalConfig {
    /// Service base URL, without trailing slash
    pub base_url: String,

    /// Account whose lists are fetched
    pub username: String,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// `status` query parameter of list requests
    pub list_status: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            default_level: "info".to_string(),
            console: true,
            file: false,
            json_format: false,
        }
    }
}

impl Default for MalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://myanimelist.net".to_string(),
            username: String::new(),
            user_agent: concat!("mal-client/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 30,
            list_status: "all".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Convert into the runtime logging configuration for a component
    ///
    /// Unknown level names fall back to INFO.
    pub fn to_log_config(&self, component: &str) -> LogConfig {
        let default_level = self.default_level.parse::<Level>().unwrap_or_else(|_| {
            tracing::warn!(level = %self.default_level, "Unknown log level, using info");
            Level::INFO
        });

        LogConfig {
            log_dir: self.log_dir.clone(),
            component: component.to_string(),
            default_level,
            console: self.console,
            file: self.file,
            json_format: self.json_format,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration from a TOML file or create default if not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }
}
