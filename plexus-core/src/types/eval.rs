//! Evaluation inputs and outputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::IntermediateStep;

/// One dataset entry and what the workflow produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalInputItem {
    /// Entry id
    pub id: Value,
    /// Input handed to the workflow
    pub input_obj: Value,
    /// Expected answer
    #[serde(default)]
    pub expected_output_obj: Value,
    /// Workflow output, `Null` until the workflow ran
    #[serde(default)]
    pub output_obj: Value,
    /// Intermediate steps recorded while producing the output
    #[serde(default)]
    pub trajectory: Vec<IntermediateStep>,
}

impl EvalInputItem {
    /// Create an entry that has not been run yet.
    pub fn new(id: impl Into<Value>, input_obj: impl Into<Value>, expected_output_obj: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            input_obj: input_obj.into(),
            expected_output_obj: expected_output_obj.into(),
            output_obj: Value::Null,
            trajectory: Vec::new(),
        }
    }

    /// Whether the workflow already produced a non-empty output.
    #[must_use]
    pub fn has_output(&self) -> bool {
        match &self.output_obj {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}

/// The full set of entries evaluated in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalInput {
    /// Dataset entries
    pub eval_input_items: Vec<EvalInputItem>,
}

/// Score of one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalOutputItem {
    /// Entry id
    pub id: Value,
    /// Score given by the evaluator
    pub score: Value,
    /// Evaluator reasoning
    #[serde(default)]
    pub reasoning: Value,
}

/// Result of one evaluator over the whole input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalOutput {
    /// Mean score, if the evaluator computes one
    #[serde(default)]
    pub average_score: Option<f64>,
    /// Per entry scores
    pub eval_output_items: Vec<EvalOutputItem>,
}
