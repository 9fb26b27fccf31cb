//! Dataset evaluation.
//!
//! An [`EvaluationRun`] pushes every dataset item through a
//! [`SessionManager`], records each item's output and intermediate-step
//! trajectory, and then hands the whole set to every evaluator at once.
//! One evaluator failing never affects the others.

pub mod dataset;

use futures::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};
use tracing::{debug, error, info, warn};

use plexus_core::{
    EvalBuilder, Result,
    config::DatasetConfig,
    traits::EvaluatorInfo,
    types::{EvalInput, EvalInputItem, EvalOutput},
};

use crate::{builder::WorkflowBuilder, session::SessionManager};

pub use dataset::{load_dataset, parse_dataset};

/// File the workflow outputs are written to.
pub const WORKFLOW_OUTPUT_FILE: &str = "workflow_output.json";

/// Outcome of an [`EvaluationRun`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationResults {
    /// Items with their outputs and trajectories
    pub eval_input: EvalInput,
    /// Whether a workflow failure stopped the remaining items
    pub workflow_interrupted: bool,
    /// Output of every evaluator that succeeded
    pub evaluation_results: IndexMap<String, EvalOutput>,
    /// Files written to the output directory
    pub output_files: Vec<PathBuf>,
}

/// Runs a dataset through a workflow and scores it.
#[derive(Debug, Clone)]
pub struct EvaluationRun {
    session_manager: SessionManager,
    evaluators: IndexMap<String, EvaluatorInfo>,
    output_dir: PathBuf,
}

impl EvaluationRun {
    /// Create a run with explicit evaluators.
    pub fn new(
        session_manager: SessionManager,
        evaluators: IndexMap<String, EvaluatorInfo>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session_manager,
            evaluators,
            output_dir: output_dir.into(),
        }
    }

    /// Create a run using the evaluators and output directory of `builder`.
    pub fn from_builder(builder: &WorkflowBuilder, session_manager: SessionManager) -> Self {
        Self::new(session_manager, builder.evaluators(), builder.get_output_dir())
    }

    /// Directory outputs are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn run_item(&self, mut item: EvalInputItem, interrupted: &AtomicBool) -> EvalInputItem {
        if interrupted.load(Ordering::SeqCst) {
            return item;
        }
        let mut run = match self.session_manager.run(item.input_obj.clone()).await {
            Ok(run) => run,
            Err(e) => {
                error!("Failed to start the workflow for item {}: {}", item.id, e);
                interrupted.store(true, Ordering::SeqCst);
                return item;
            }
        };
        if interrupted.load(Ordering::SeqCst) {
            debug!("Skipping item {} after an earlier failure", item.id);
            return item;
        }

        let steps = run
            .context()
            .map(|context| context.event_stream().subscribe_stream());
        let result = run.result().await;
        let trajectory = match steps {
            Ok(steps) => steps.collect_items().await.0,
            Err(_) => Vec::new(),
        };

        match result {
            Ok(output) => {
                item.output_obj = output;
                item.trajectory = trajectory;
            }
            Err(e) => {
                error!("Failed to run the workflow for item {}: {}", item.id, e);
                interrupted.store(true, Ordering::SeqCst);
            }
        }
        if let Err(e) = run.exit() {
            warn!("Failed to close the run for item {}: {}", item.id, e);
        }
        item
    }

    /// Run every item through the workflow.
    ///
    /// Items are started concurrently within the session manager's limit.
    /// After the first workflow failure no further items are run; the
    /// returned flag reports whether that happened.
    pub async fn run_workflow(&self, input: EvalInput) -> (EvalInput, bool) {
        let interrupted = AtomicBool::new(false);
        let items = join_all(
            input
                .eval_input_items
                .into_iter()
                .map(|item| self.run_item(item, &interrupted)),
        )
        .await;
        let interrupted = interrupted.load(Ordering::SeqCst);
        if interrupted {
            warn!("Workflow execution was interrupted; remaining items were skipped");
        }
        (
            EvalInput {
                eval_input_items: items,
            },
            interrupted,
        )
    }

    /// Run every evaluator concurrently on `input`.
    ///
    /// Failed evaluators are logged and left out of the result.
    pub async fn run_evaluators(&self, input: &EvalInput) -> IndexMap<String, EvalOutput> {
        let outcomes = join_all(self.evaluators.iter().map(|(name, info)| async move {
            (name.clone(), info.evaluator().evaluate(input).await)
        }))
        .await;

        let mut results = IndexMap::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(output) => {
                    info!(
                        "Evaluator `{}` scored {} items, average {:?}",
                        name,
                        output.eval_output_items.len(),
                        output.average_score
                    );
                    results.insert(name, output);
                }
                Err(e) => error!("Evaluator `{}` failed: {}", name, e),
            }
        }
        results
    }

    /// Write the workflow outputs and every evaluator output as JSON files.
    pub async fn write_output(
        &self,
        input: &EvalInput,
        results: &IndexMap<String, EvalOutput>,
    ) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut written = Vec::with_capacity(results.len() + 1);
        let workflow_output = self.output_dir.join(WORKFLOW_OUTPUT_FILE);
        tokio::fs::write(
            &workflow_output,
            serde_json::to_vec_pretty(&input.eval_input_items)?,
        )
        .await?;
        written.push(workflow_output);

        for (name, output) in results {
            let path = self.output_dir.join(format!("{name}_output.json"));
            tokio::fs::write(&path, serde_json::to_vec_pretty(output)?).await?;
            written.push(path);
        }
        info!("Evaluation output written to {}", self.output_dir.display());
        Ok(written)
    }

    /// Run the workflow on `input`, evaluate and write the outputs.
    pub async fn run(&self, input: EvalInput) -> Result<EvaluationResults> {
        let (eval_input, workflow_interrupted) = self.run_workflow(input).await;
        let evaluation_results = self.run_evaluators(&eval_input).await;
        let output_files = self.write_output(&eval_input, &evaluation_results).await?;
        Ok(EvaluationResults {
            eval_input,
            workflow_interrupted,
            evaluation_results,
            output_files,
        })
    }

    /// Load `dataset` and [`run`](Self::run) it.
    pub async fn run_dataset(&self, dataset: &DatasetConfig) -> Result<EvaluationResults> {
        let input = load_dataset(dataset).await?;
        self.run(input).await
    }
}
