//! Outer surfaces: front ends and remote registry handlers.

use async_trait::async_trait;

use crate::{Result, types::DiscoveryMetadata};

/// Serves a workflow to users (console, HTTP, ...).
#[async_trait]
pub trait FrontEnd: Send + Sync {
    /// Run until the front end shuts down.
    async fn run(&self) -> Result<()>;
}

/// Publishes and searches component packages in a remote registry.
#[async_trait]
pub trait RegistryHandler: Send + Sync {
    /// Publish the components of a package.
    async fn publish(&self, components: &[DiscoveryMetadata]) -> Result<()>;

    /// Search components matching `query`.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<DiscoveryMetadata>>;
}
