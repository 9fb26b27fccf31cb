//! Data model shared across the runtime.

pub mod component;
pub mod dependencies;
pub mod discovery;
pub mod eval;
pub mod intermediate_step;
pub mod span;

pub use component::{
    ComponentGroup, ComponentKind, ComponentRef, EmbedderRef, Framework, FunctionRef, LlmRef,
    MemoryRef, RetrieverRef,
};
pub use dependencies::FunctionDependencies;
pub use discovery::{DiscoveryMetadata, DiscoveryStatus};
pub use eval::{EvalInput, EvalInputItem, EvalOutput, EvalOutputItem};
pub use intermediate_step::{
    IntermediateStep, IntermediateStepCategory, IntermediateStepPayload, IntermediateStepState,
    IntermediateStepType, InvocationNode, StreamEventData, TokenUsage, TraceMetadata, UsageInfo,
};
pub use span::{Span, SpanStatus};
