//! Spans produced from the intermediate step stream.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{IntermediateStepCategory, intermediate_step::now_seconds};

/// Final status of a span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    /// Closed normally or still open
    #[default]
    Unset,
    /// Completed successfully
    Ok,
    /// Closed with an error description
    Error(String),
}

/// One node of a run's span tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Trace shared by every span of one run
    pub trace_id: String,
    /// Unique span id
    pub span_id: String,
    /// Enclosing span, `None` for the root
    pub parent_span_id: Option<String>,
    /// Span name
    pub name: String,
    /// Category of the event that opened the span
    pub kind: IntermediateStepCategory,
    /// Start, seconds since the Unix epoch
    pub start_time: f64,
    /// End, seconds since the Unix epoch
    pub end_time: Option<f64>,
    /// Attributes attached on open and close
    pub attributes: IndexMap<String, Value>,
    /// Final status
    pub status: SpanStatus,
}

impl Span {
    /// Open a span now.
    pub fn start(
        trace_id: impl Into<String>,
        parent_span_id: Option<String>,
        name: impl Into<String>,
        kind: IntermediateStepCategory,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: Uuid::new_v4().to_string(),
            parent_span_id,
            name: name.into(),
            kind,
            start_time: now_seconds(),
            end_time: None,
            attributes: IndexMap::new(),
            status: SpanStatus::Unset,
        }
    }

    /// Attach an attribute, replacing any previous value.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Close the span.
    pub fn end(&mut self, status: SpanStatus) {
        self.end_time = Some(now_seconds());
        self.status = status;
    }

    /// Whether the span was closed.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// Duration in seconds, once closed.
    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.start_time)
    }
}
