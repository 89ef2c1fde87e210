//! Logging infrastructure for hosts embedding the catalog client.
//!
//! The client library only emits `tracing` events; this module installs a
//! subscriber with an env filter, a console layer and a rotating file layer.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log directory path
    pub log_dir: String,
    /// Component name (used for log file naming)
    pub component: String,
    /// Default log level
    pub default_level: Level,
    /// Enable console output
    pub console: bool,
    /// Enable file output
    pub file: bool,
    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            component: "mal-client".to_string(),
            default_level: Level::INFO,
            console: true,
            file: false,
            json_format: false,
        }
    }
}

/// Build the default filter directive string for a configuration
///
/// Component names use dashes, tracing targets use underscores.
pub fn filter_directives(config: &LogConfig) -> String {
    format!(
        "{}={},shared={},mal_client={},hyper=warn,reqwest=warn",
        config.component.replace('-', "_"),
        config.default_level,
        config.default_level,
        config.default_level
    )
}

/// Initialize logging with the given configuration
///
/// Sets up tracing with:
/// - Daily file rotation (when file output is enabled)
/// - Structured logging with contextual fields
/// - Module-specific log levels, overridable via RUST_LOG
/// - Optional JSON formatting
pub fn init(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config)));

    let mut layers = Vec::new();

    // Console layer (human-readable)
    if config.console {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::NONE)
            .with_writer(std::io::stderr)
            .boxed();
        layers.push(console_layer);
    }

    // File layer with rotation
    if config.file {
        let log_dir = Path::new(&config.log_dir);
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", config.log_dir))?;

        let file_appender = tracing_appender::rolling::daily(log_dir, &config.component);

        let file_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(file_appender)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_thread_names(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(false)
                .with_writer(file_appender)
                .boxed()
        };

        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(
        component = %config.component,
        log_dir = %config.log_dir,
        file = config.file,
        "Logging initialized"
    );

    Ok(())
}

/// Initialize console-only logging for a component
pub fn init_for_component(component: &str) -> Result<()> {
    init(LogConfig {
        component: component.to_string(),
        ..Default::default()
    })
}
