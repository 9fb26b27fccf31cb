//! # Plexus Runtime
//!
//! Turns a declarative [`WorkflowConfig`](plexus_core::WorkflowConfig) into a
//! running workflow.
//!
//! - **Builder**: [`WorkflowBuilder`] builds every configured component in
//!   dependency order and tears them down in reverse
//! - **Execution**: [`Workflow`] and its single-use [`Runner`]
//! - **Admission control**: [`SessionManager`] bounds concurrent runs
//! - **Observability**: [`ObservabilityListener`] turns intermediate steps
//!   into spans for the configured exporters
//! - **Evaluation**: [`EvaluationRun`] runs a dataset and fans the results
//!   out to every evaluator
//! - **Plugins**: [`Plugin`] manifests and [`discover_and_register_plugins`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plexus_runtime::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> plexus_core::Result<()> {
//! let mut registry = TypeRegistry::new();
//! discover_and_register_plugins(&mut registry, &[&BuiltinsPlugin], PluginTypes::ALL);
//!
//! let answer: String = load_workflow("workflow.toml", Arc::new(registry), 8, |sessions| async move {
//!     sessions.result_as("Hello").await
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used types and traits
pub mod prelude;

// Runtime modules
pub mod builder;
pub mod eval;
pub mod loader;
pub mod logging;
pub mod observability;
pub mod runner;
pub mod session;
pub mod workflow;

// Re-export key types at crate root for convenience
pub use builder::{BuilderState, WorkflowBuilder};
pub use eval::{EvaluationResults, EvaluationRun};
pub use loader::{
    BuiltinsPlugin, Plugin, PluginTypes, discover_and_register_plugins, load_config, load_workflow,
    start_front_end,
};
pub use observability::ObservabilityListener;
pub use runner::{Runner, RunnerState};
pub use session::{SessionManager, SessionRun};
pub use workflow::{WORKFLOW_FUNCTION_NAME, Workflow, WorkflowComponents};

use plexus_core::{Result, TypeRegistry};

/// Version information for the Plexus runtime library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the Plexus runtime library.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Register the logging methods and span exporters shipped with this crate.
pub fn register_builtins(registry: &mut TypeRegistry) -> Result<()> {
    logging::register(registry)?;
    observability::exporters::register(registry)
}
