//! Reading declarative documents from disk.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::{Result, error::PlexusError};

static ENV_VAR: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}"));

/// Document formats a workflow configuration can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON document
    Json,
    /// TOML document
    Toml,
}

impl ConfigFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(PlexusError::configuration(format!(
                "Unsupported configuration file extension {:?} for {}. Expected `json` or `toml`",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    /// Parse `content` into a JSON value tree after environment substitution.
    pub fn parse(self, content: &str) -> Result<Value> {
        let content = substitute_env_variables(content)?;
        match self {
            Self::Json => serde_json::from_str(&content).map_err(|e| {
                PlexusError::configuration(format!("Invalid JSON configuration: {e}"))
            }),
            Self::Toml => Ok(toml::from_str::<Value>(&content)?),
        }
    }
}

/// Replace `${VAR}` and `${VAR:default}` with the environment's values.
///
/// Unset variables without a default become empty strings.
pub fn substitute_env_variables(content: &str) -> Result<String> {
    let pattern = ENV_VAR
        .as_ref()
        .map_err(|e| PlexusError::internal(format!("Invalid substitution pattern: {e}")))?;
    let substituted = pattern.replace_all(content, |captures: &Captures<'_>| {
        let default_value = captures.get(2).map_or("", |m| m.as_str());
        std::env::var(&captures[1]).unwrap_or_else(|_| default_value.to_string())
    });
    Ok(substituted.into_owned())
}

/// Read and parse a configuration file, choosing the format by extension.
pub async fn read_config_file(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    debug!("Loading configuration file: {}", path.display());
    let format = ConfigFormat::from_path(path)?;
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        PlexusError::configuration(format!(
            "Failed to read configuration file {}: {e}",
            path.display()
        ))
    })?;
    format.parse(&content)
}
