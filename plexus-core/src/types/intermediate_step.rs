//! Intermediate step events and invocation nodes.
//!
//! Intermediate steps are the structured start/chunk/end lifecycle events
//! published while a workflow runs. They are consumed by the observability
//! listener and by evaluation, and are immutable once pushed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use strum::Display;
use uuid::Uuid;

use crate::{error::PlexusError, types::Framework, Result};

/// A node in the call tree of active functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationNode {
    /// Unique id of this invocation
    pub function_id: String,
    /// Name of the invoked function
    pub function_name: String,
    /// Id of the parent invocation, if any
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Name of the parent invocation, if any
    #[serde(default)]
    pub parent_name: Option<String>,
}

impl InvocationNode {
    /// Create a node without a parent.
    pub fn new(function_id: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            function_id: function_id.into(),
            function_name: function_name.into(),
            parent_id: None,
            parent_name: None,
        }
    }

    /// The root of every call tree.
    #[must_use]
    pub fn root() -> Self {
        Self::new("root", "root")
    }

    /// Create a fresh child of `self` named `function_name`.
    #[must_use]
    pub fn child(&self, function_name: impl Into<String>) -> Self {
        Self {
            function_id: Uuid::new_v4().to_string(),
            function_name: function_name.into(),
            parent_id: Some(self.function_id.clone()),
            parent_name: Some(self.function_name.clone()),
        }
    }
}

impl Default for InvocationNode {
    fn default() -> Self {
        Self::new("N/A", "N/A")
    }
}

/// Category of an intermediate step, derived from its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IntermediateStepCategory {
    /// LLM calls
    Llm,
    /// Tool calls
    Tool,
    /// Whole workflow
    Workflow,
    /// Generic task
    Task,
    /// Function invocation
    Function,
    /// User defined
    Custom,
}

/// Lifecycle state of an intermediate step, derived from its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IntermediateStepState {
    /// Opens a step
    Start,
    /// Streams part of a step's output
    Chunk,
    /// Closes a step
    End,
}

/// The closed set of intermediate step event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum IntermediateStepType {
    LlmStart,
    LlmEnd,
    LlmNewToken,
    ToolStart,
    ToolEnd,
    WorkflowStart,
    WorkflowEnd,
    TaskStart,
    TaskEnd,
    FunctionStart,
    FunctionEnd,
    CustomStart,
    CustomEnd,
}

impl IntermediateStepType {
    /// Category this event type belongs to.
    #[must_use]
    pub fn category(self) -> IntermediateStepCategory {
        match self {
            Self::LlmStart | Self::LlmEnd | Self::LlmNewToken => IntermediateStepCategory::Llm,
            Self::ToolStart | Self::ToolEnd => IntermediateStepCategory::Tool,
            Self::WorkflowStart | Self::WorkflowEnd => IntermediateStepCategory::Workflow,
            Self::TaskStart | Self::TaskEnd => IntermediateStepCategory::Task,
            Self::FunctionStart | Self::FunctionEnd => IntermediateStepCategory::Function,
            Self::CustomStart | Self::CustomEnd => IntermediateStepCategory::Custom,
        }
    }

    /// Lifecycle state this event type represents.
    #[must_use]
    pub fn state(self) -> IntermediateStepState {
        match self {
            Self::LlmNewToken => IntermediateStepState::Chunk,
            Self::LlmStart
            | Self::ToolStart
            | Self::WorkflowStart
            | Self::TaskStart
            | Self::FunctionStart
            | Self::CustomStart => IntermediateStepState::Start,
            Self::LlmEnd
            | Self::ToolEnd
            | Self::WorkflowEnd
            | Self::TaskEnd
            | Self::FunctionEnd
            | Self::CustomEnd => IntermediateStepState::End,
        }
    }
}

/// Input, output and streamed chunk carried by an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamEventData {
    /// Input of the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Output of the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Streamed chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<Value>,
}

/// Token counts reported by an LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u64,
    /// Tokens in the completion
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
}

/// Usage statistics attached to END events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageInfo {
    /// Token usage of the step
    #[serde(default)]
    pub token_usage: TokenUsage,
    /// Number of LLM calls made
    #[serde(default)]
    pub num_llm_calls: u64,
    /// Seconds elapsed between consecutive calls
    #[serde(default)]
    pub seconds_between_calls: u64,
}

/// Well-known trace metadata fields; extra keys are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub chat_responses: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub chat_inputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub tool_inputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub tool_outputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub tool_info: Option<Value>,
    /// Any other metadata
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

pub(crate) fn now_seconds() -> f64 {
    let now = Utc::now();
    #[allow(clippy::cast_precision_loss)]
    let micros = now.timestamp_micros() as f64;
    micros / 1_000_000.0
}

fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// The event published for one lifecycle transition of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateStepPayload {
    /// Event type; category and state are derived from it
    pub event_type: IntermediateStepType,
    /// Seconds since the unix epoch when the event was created
    #[serde(default = "now_seconds")]
    pub event_timestamp: f64,
    /// Start time of the step, only allowed on END events
    #[serde(default)]
    pub span_event_timestamp: Option<f64>,
    /// Framework that produced the event
    #[serde(default)]
    pub framework: Option<Framework>,
    /// Step name
    #[serde(default)]
    pub name: Option<String>,
    /// Free form tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Trace metadata
    #[serde(default)]
    pub metadata: Option<TraceMetadata>,
    /// Input/output/chunk data
    #[serde(default)]
    pub data: Option<StreamEventData>,
    /// Usage statistics
    #[serde(default)]
    pub usage_info: Option<UsageInfo>,
    /// Step id shared by the START, CHUNK and END events of one step
    #[serde(rename = "UUID", default = "new_uuid")]
    pub uuid: String,
}

impl IntermediateStepPayload {
    /// Create a payload of the given type with a fresh id and timestamp.
    #[must_use]
    pub fn new(event_type: IntermediateStepType) -> Self {
        Self {
            event_type,
            event_timestamp: now_seconds(),
            span_event_timestamp: None,
            framework: None,
            name: None,
            tags: None,
            metadata: None,
            data: None,
            usage_info: None,
            uuid: new_uuid(),
        }
    }

    /// Use an explicit step id, typically the id of the matching START.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Set the step name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the producing framework.
    #[must_use]
    pub fn with_framework(mut self, framework: impl Into<Framework>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    /// Set the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Set the trace metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: TraceMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Set the event data.
    #[must_use]
    pub fn with_data(mut self, data: StreamEventData) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the usage statistics.
    #[must_use]
    pub fn with_usage_info(mut self, usage_info: UsageInfo) -> Self {
        self.usage_info = Some(usage_info);
        self
    }

    /// Annotate the start time of the step.
    ///
    /// # Errors
    ///
    /// Fails unless this is an END event.
    pub fn with_span_event_timestamp(mut self, timestamp: f64) -> Result<Self> {
        self.span_event_timestamp = Some(timestamp);
        self.validate()?;
        Ok(self)
    }

    /// Derived event category.
    #[must_use]
    pub fn event_category(&self) -> IntermediateStepCategory {
        self.event_type.category()
    }

    /// Derived event state.
    #[must_use]
    pub fn event_state(&self) -> IntermediateStepState {
        self.event_type.state()
    }

    /// Check the payload invariants.
    pub fn validate(&self) -> Result<()> {
        if self.span_event_timestamp.is_some() && self.event_state() != IntermediateStepState::End {
            return Err(PlexusError::validation(
                "span_event_timestamp can only be provided for events with an END state",
            ));
        }
        Ok(())
    }
}

/// A payload stamped with the ancestry of the function that was active
/// when it was published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntermediateStep {
    /// Active function at publish time
    #[serde(default)]
    pub function_ancestry: InvocationNode,
    /// The published event
    pub payload: IntermediateStepPayload,
}

impl IntermediateStep {
    /// Event type of the payload.
    #[must_use]
    pub fn event_type(&self) -> IntermediateStepType {
        self.payload.event_type
    }

    /// Derived category of the payload.
    #[must_use]
    pub fn event_category(&self) -> IntermediateStepCategory {
        self.payload.event_category()
    }

    /// Derived state of the payload.
    #[must_use]
    pub fn event_state(&self) -> IntermediateStepState {
        self.payload.event_state()
    }

    /// Step id.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.payload.uuid
    }

    /// Step name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.payload.name.as_deref()
    }

    /// Event timestamp in seconds.
    #[must_use]
    pub fn event_timestamp(&self) -> f64 {
        self.payload.event_timestamp
    }

    /// Event data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&StreamEventData> {
        self.payload.data.as_ref()
    }

    /// Usage statistics, if any.
    #[must_use]
    pub fn usage_info(&self) -> Option<&UsageInfo> {
        self.payload.usage_info.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(IntermediateStepType::LlmStart, IntermediateStepCategory::Llm, IntermediateStepState::Start)]
    #[test_case(IntermediateStepType::LlmNewToken, IntermediateStepCategory::Llm, IntermediateStepState::Chunk)]
    #[test_case(IntermediateStepType::ToolEnd, IntermediateStepCategory::Tool, IntermediateStepState::End)]
    #[test_case(IntermediateStepType::FunctionStart, IntermediateStepCategory::Function, IntermediateStepState::Start)]
    #[test_case(IntermediateStepType::CustomEnd, IntermediateStepCategory::Custom, IntermediateStepState::End)]
    fn test_derived_category_and_state(
        event_type: IntermediateStepType,
        category: IntermediateStepCategory,
        state: IntermediateStepState,
    ) {
        let payload = IntermediateStepPayload::new(event_type);
        assert_eq!(payload.event_category(), category);
        assert_eq!(payload.event_state(), state);
    }

    #[test]
    fn test_span_event_timestamp_only_on_end() {
        let start = IntermediateStepPayload::new(IntermediateStepType::TaskStart);
        assert!(start.with_span_event_timestamp(1.0).is_err());

        let end = IntermediateStepPayload::new(IntermediateStepType::TaskEnd)
            .with_span_event_timestamp(1.0)
            .unwrap();
        assert_eq!(end.span_event_timestamp, Some(1.0));
    }

    #[test]
    fn test_payload_wire_names() {
        let payload = IntermediateStepPayload::new(IntermediateStepType::LlmNewToken).with_uuid("abc");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["event_type"], "LLM_NEW_TOKEN");
        assert_eq!(value["UUID"], "abc");
    }

    #[test]
    fn test_default_ancestry_is_not_available() {
        let step: IntermediateStep = serde_json::from_value(serde_json::json!({
            "payload": {"event_type": "CUSTOM_START"}
        }))
        .unwrap();
        assert_eq!(step.function_ancestry.function_id, "N/A");
        assert!(!step.uuid().is_empty());
    }

    #[test]
    fn test_child_links_parent() {
        let root = InvocationNode::root();
        let child = root.child("search");
        assert_eq!(child.parent_id.as_deref(), Some("root"));
        assert_eq!(child.parent_name.as_deref(), Some("root"));
        assert_ne!(child.function_id, root.function_id);
    }
}
