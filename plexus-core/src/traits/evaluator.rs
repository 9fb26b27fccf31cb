//! Evaluators.

use async_trait::async_trait;
use std::{fmt, sync::Arc};

use crate::{
    Result,
    config::ConfigHandle,
    types::{EvalInput, EvalOutput},
};

/// Scores the outputs of an evaluation run.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Score every item of `input`.
    async fn evaluate(&self, input: &EvalInput) -> Result<EvalOutput>;
}

/// An evaluator yielded by evaluator builds.
#[derive(Clone)]
pub struct EvaluatorInfo {
    config: ConfigHandle,
    evaluator: Arc<dyn Evaluator>,
    description: String,
}

impl fmt::Debug for EvaluatorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluatorInfo")
            .field("config", &self.config)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl EvaluatorInfo {
    /// Describe an evaluator built from `config`.
    pub fn new(config: ConfigHandle, evaluator: Arc<dyn Evaluator>, description: impl Into<String>) -> Self {
        Self {
            config,
            evaluator,
            description: description.into(),
        }
    }

    /// Configuration the evaluator was built from.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// The evaluator.
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Description.
    pub fn description(&self) -> &str {
        &self.description
    }
}
