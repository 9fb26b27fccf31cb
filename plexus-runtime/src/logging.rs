//! Built-in logging methods.
//!
//! A logging method yields a boxed [`tracing_subscriber::Layer`]. The layers
//! of every configured method are installed once, on builder enter.

use serde::{Deserialize, Serialize};
use std::{fs::OpenOptions, path::PathBuf, sync::{Arc, Mutex}};
use tracing::debug;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use plexus_core::{
    Built, PlexusError, Result, TypedConfig, TypeRegistry,
    registry::RegisteredInfo,
    traits::LoggingLayer,
};

fn default_console_level() -> String {
    "info".to_string()
}

fn default_file_level() -> String {
    "debug".to_string()
}

/// Log to standard output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleLoggingConfig {
    /// Filter directive, e.g. `info` or `plexus=debug`
    #[serde(default = "default_console_level")]
    pub level: String,
}

impl Default for ConsoleLoggingConfig {
    fn default() -> Self {
        Self {
            level: default_console_level(),
        }
    }
}

impl TypedConfig for ConsoleLoggingConfig {
    const TYPE_NAME: &'static str = "console";
    const DESCRIPTION: &'static str = "Log to the console";
}

/// Append log lines to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingConfig {
    /// File to append to; parent directories are created
    pub path: PathBuf,
    /// Filter directive
    #[serde(default = "default_file_level")]
    pub level: String,
}

impl TypedConfig for FileLoggingConfig {
    const TYPE_NAME: &'static str = "file";
    const DESCRIPTION: &'static str = "Log to a file";
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| PlexusError::configuration(format!("Invalid log level `{level}`: {e}")))
}

/// Layer writing to standard output.
pub fn console_layer(config: &ConsoleLoggingConfig) -> Result<LoggingLayer> {
    Ok(tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(env_filter(&config.level)?)
        .boxed())
}

/// Layer appending to `config.path`.
pub fn file_layer(config: &FileLoggingConfig) -> Result<LoggingLayer> {
    if let Some(parent) = config.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&config.path)?;
    Ok(tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(env_filter(&config.level)?)
        .boxed())
}

/// Install `layers` as the global subscriber.
///
/// Returns `false` when there was nothing to install or a global subscriber
/// is already set.
pub fn install_logging_layers(layers: Vec<LoggingLayer>) -> bool {
    if layers.is_empty() {
        return false;
    }
    match tracing_subscriber::registry().with(layers).try_init() {
        Ok(()) => true,
        Err(e) => {
            debug!("Keeping the existing global subscriber: {}", e);
            false
        }
    }
}

pub(crate) fn register(registry: &mut TypeRegistry) -> Result<()> {
    registry.register_logging_method(
        RegisteredInfo::logging_method(|config: Arc<ConsoleLoggingConfig>, _builder| async move {
            console_layer(&config).map(Built::new)
        })
        .with_package(crate::NAME, crate::VERSION),
    )?;
    registry.register_logging_method(
        RegisteredInfo::logging_method(|config: Arc<FileLoggingConfig>, _builder| async move {
            file_layer(&config).map(Built::new)
        })
        .with_package(crate::NAME, crate::VERSION),
    )
}
