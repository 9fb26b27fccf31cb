//! # Plexus - Workflow Orchestration Runtime
//!
//! Plexus assembles LLM workflows and agents out of plugin-registered
//! components. A declarative document names the components, the runtime
//! builds them in dependency order, runs the workflow and tears everything
//! down again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plexus::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> plexus::core::Result<()> {
//! plexus::init();
//! let registry = plexus::default_registry();
//!
//! let answer: String = load_workflow("workflow.toml", Arc::new(registry), 8, |sessions| async move {
//!     sessions.result_as("What can you do?").await
//! })
//! .await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **plexus-core**: errors, data model, typed configuration, context,
//!   functions, component traits and the type registry
//! - **plexus-runtime**: workflow builder, runner, sessions, observability,
//!   plugin loading and evaluation

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use tracing_subscriber::EnvFilter;

// Re-export all public APIs from sub-crates
pub use plexus_core as core;
pub use plexus_runtime as runtime;

/// Prelude module for convenient imports.
///
/// Contains the core prelude plus the runtime's builder, runner and loader
/// types.
pub mod prelude {
    pub use plexus_runtime::prelude::*;
}

/// Version information for the Plexus runtime.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Install a default `fmt` subscriber.
///
/// Honors `RUST_LOG` and falls back to `plexus=info`. Returns `false` when a
/// global subscriber was already installed.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plexus=info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!("Initializing Plexus v{}", VERSION);
    }
    installed
}

/// A registry holding the built-in logging methods and span exporters.
pub fn default_registry() -> core::TypeRegistry {
    let mut registry = core::TypeRegistry::new();
    runtime::discover_and_register_plugins(
        &mut registry,
        &[&runtime::BuiltinsPlugin],
        runtime::PluginTypes::ALL,
    );
    registry
}
