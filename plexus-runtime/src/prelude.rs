//! Prelude module for convenient imports.
//!
//! Brings the runtime entry points into scope together with the core
//! prelude.
//!
//! # Examples
//!
//! ```rust
//! use plexus_runtime::prelude::*;
//!
//! let builder = WorkflowBuilder::new(std::sync::Arc::new(TypeRegistry::new()));
//! assert_eq!(builder.state(), BuilderState::Uninitialized);
//! ```

pub use plexus_core::prelude::*;

// Building and running
pub use crate::builder::{BuilderState, WorkflowBuilder};
pub use crate::runner::{Runner, RunnerState};
pub use crate::session::{SessionManager, SessionRun};
pub use crate::workflow::{WORKFLOW_FUNCTION_NAME, Workflow, WorkflowComponents};

// Evaluation
pub use crate::eval::{EvaluationResults, EvaluationRun, load_dataset};

// Observability and logging
pub use crate::logging::{ConsoleLoggingConfig, FileLoggingConfig};
pub use crate::observability::{
    InMemorySpanExporter, InMemorySpanExporterConfig, LogSpanExporter, LogSpanExporterConfig,
    ObservabilityListener,
};

// Plugins
pub use crate::loader::{
    BuiltinsPlugin, Plugin, PluginTypes, discover_and_register_plugins, load_config, load_workflow,
};
