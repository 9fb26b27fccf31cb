//! Provider descriptors.

use std::sync::Arc;

use crate::config::{ConfigHandle, TypedConfig, downcast_config};

/// Framework-agnostic descriptor yielded by LLM, embedder and retriever
/// provider builds.
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    config: ConfigHandle,
    description: Option<String>,
}

impl ProviderInfo {
    /// Describe a provider built from `config`.
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            description: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The provider configuration.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// The provider configuration as `C`.
    pub fn config_as<C: TypedConfig>(&self) -> Option<Arc<C>> {
        downcast_config::<C>(&self.config)
    }

    /// Description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Descriptor yielded by LLM provider builds.
pub type LlmProviderInfo = ProviderInfo;

/// Descriptor yielded by embedder provider builds.
pub type EmbedderProviderInfo = ProviderInfo;

/// Descriptor yielded by retriever provider builds.
pub type RetrieverProviderInfo = ProviderInfo;
