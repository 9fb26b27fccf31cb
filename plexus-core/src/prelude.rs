//! Prelude module for convenient imports.
//!
//! This module re-exports the types and traits plugins and applications use
//! most often.
//!
//! # Examples
//!
//! ```rust
//! use plexus_core::prelude::*;
//!
//! let context = Context::new();
//! assert_eq!(context.active_function().function_name, "root");
//! ```

// Re-export core error types
pub use crate::error::{PlexusError, Result};

// Configuration
pub use crate::config::{
    AnyConfig, ConfigHandle, ConfigType, TypedConfig, WorkflowConfig, config_handle,
    downcast_config,
};

// Context state
pub use crate::context::{
    Context, HumanResponse, IntermediateStepManager, InteractionPrompt, UserInputCallback,
};

// Functions
pub use crate::function::{
    Function, FunctionArtifact, FunctionExt, FunctionInfo, LambdaFunction, TypeConverter,
    ValueStream,
};

// Registry
pub use crate::registry::{
    GlobalTypeRegistry, RegisteredClientInfo, RegisteredFunctionInfo, RegisteredInfo,
    RegisteredToolWrapper, TypeRegistry,
};

// Component traits
pub use crate::traits::{
    Builder, BuilderExt, Built, EvalBuilder, Evaluator, EvaluatorInfo, MemoryEditor, MemoryItem,
    ProviderInfo, SpanExporter,
};

// Data model
pub use crate::types::{
    ComponentGroup, ComponentKind, ComponentRef, EmbedderRef, EvalInput, EvalInputItem,
    EvalOutput, EvalOutputItem, Framework, FunctionRef, IntermediateStep,
    IntermediateStepPayload, IntermediateStepType, InvocationNode, LlmRef, MemoryRef,
    RetrieverRef, Span, SpanStatus,
};
