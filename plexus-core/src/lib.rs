//! # Plexus Core
//!
//! Core traits, data model and registries for the Plexus workflow runtime.
//!
//! This crate provides the building blocks every other Plexus crate and
//! every plugin is written against:
//!
//! - **Data model**: intermediate steps, invocation nodes, spans, discovery
//!   metadata and evaluation records
//! - **Configuration**: typed component configurations and the declarative
//!   [`WorkflowConfig`](config::WorkflowConfig)
//! - **Context state**: the explicitly propagated [`Context`] with its event
//!   stream and [`IntermediateStepManager`]
//! - **Functions**: the uniform [`Function`] abstraction and its
//!   instrumented entry points
//! - **Component traits**: [`Builder`], [`EvalBuilder`], [`MemoryEditor`],
//!   [`Evaluator`], [`SpanExporter`]
//! - **Type registry**: [`TypeRegistry`] mapping configuration types to the
//!   build functions plugins register
//!
//! ## Quick Start
//!
//! ```rust
//! use plexus_core::prelude::*;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct EchoConfig {}
//!
//! impl TypedConfig for EchoConfig {
//!     const TYPE_NAME: &'static str = "echo";
//! }
//!
//! let mut registry = TypeRegistry::new();
//! registry
//!     .register_function(RegisteredFunctionInfo::new(
//!         |_config: Arc<EchoConfig>, _builder| async move {
//!             Ok::<_, PlexusError>(Built::new(FunctionArtifact::callable(
//!                 |input: String| async move { Ok::<_, PlexusError>(input) },
//!             )))
//!         },
//!     ))
//!     .unwrap();
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used types and traits
pub mod prelude;

// Core modules
pub mod config;
pub mod context;
pub mod error;
pub mod function;
pub mod registry;
pub mod traits;
pub mod types;

// Re-export key types at crate root for convenience
pub use config::{ConfigHandle, ConfigType, TypedConfig, WorkflowConfig};
pub use context::{Context, IntermediateStepManager};
pub use error::{PlexusError, Result};
pub use function::{Function, FunctionArtifact, FunctionExt, FunctionInfo};
pub use registry::{GlobalTypeRegistry, TypeRegistry};
pub use types::{IntermediateStep, IntermediateStepPayload, IntermediateStepType, InvocationNode};

// Re-export traits for convenience
pub use traits::*;

/// Version information for the Plexus core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the Plexus core library.
pub const NAME: &str = env!("CARGO_PKG_NAME");
