//! Built workflows.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{fmt, sync::Arc};

use plexus_core::{
    ConfigHandle, Context, Function, Result, WorkflowConfig,
    function::{TypeConverter, ValueStream},
    traits::{MemoryEditor, ProviderInfo, SpanExporter},
    types::IntermediateStep,
};

use crate::runner::Runner;

/// Name the workflow entry function is built under.
pub const WORKFLOW_FUNCTION_NAME: &str = "<workflow>";

/// Components a workflow keeps alive for its runs.
#[derive(Clone, Default)]
pub struct WorkflowComponents {
    /// Named functions
    pub functions: IndexMap<String, Arc<dyn Function>>,
    /// LLM providers
    pub llms: IndexMap<String, ProviderInfo>,
    /// Embedder providers
    pub embedders: IndexMap<String, ProviderInfo>,
    /// Memory clients
    pub memory: IndexMap<String, Arc<dyn MemoryEditor>>,
    /// Retriever providers
    pub retrievers: IndexMap<String, ProviderInfo>,
    /// Span exporters fed by every run
    pub exporters: IndexMap<String, Arc<dyn SpanExporter>>,
}

/// An executable workflow produced by
/// [`WorkflowBuilder::build`](crate::WorkflowBuilder::build).
///
/// The workflow is itself a [`Function`] delegating to its entry function,
/// so it can be nested inside other workflows.
pub struct Workflow {
    config: WorkflowConfig,
    entry: Arc<dyn Function>,
    components: WorkflowComponents,
    context: Context,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("entry", &self.entry)
            .field("functions", &self.components.functions.keys().collect::<Vec<_>>())
            .field("llms", &self.components.llms.keys().collect::<Vec<_>>())
            .field("exporters", &self.components.exporters.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Workflow {
    /// Assemble a workflow.
    pub fn new(config: WorkflowConfig, entry: Arc<dyn Function>, components: WorkflowComponents) -> Self {
        Self {
            config,
            entry,
            components,
            context: Context::new(),
        }
    }

    /// The configurations the workflow was built from.
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// The entry function.
    #[must_use]
    pub fn entry_function(&self) -> &Arc<dyn Function> {
        &self.entry
    }

    /// Named components kept alive by the workflow.
    #[must_use]
    pub fn components(&self) -> &WorkflowComponents {
        &self.components
    }

    /// Context runs derive from when no other context is given.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    fn exporters(&self) -> Vec<Arc<dyn SpanExporter>> {
        self.components.exporters.values().cloned().collect()
    }

    /// Start an entered run for `message`.
    pub fn run<M: Serialize>(&self, message: M) -> Result<Runner> {
        self.run_with_context(&self.context, message)
    }

    /// Start an entered run for `message` on top of `context`.
    pub fn run_with_context<M: Serialize>(&self, context: &Context, message: M) -> Result<Runner> {
        let input = serde_json::to_value(message)?;
        let mut runner = Runner::new(Arc::clone(&self.entry), input, context.clone(), self.exporters());
        runner.enter()?;
        Ok(runner)
    }

    /// Run `message` to completion and convert the output to `T`.
    pub async fn result_as<T, M>(&self, message: M) -> Result<T>
    where
        T: DeserializeOwned + 'static,
        M: Serialize,
    {
        let mut runner = self.run(message)?;
        let output = runner.result_as::<T>().await?;
        runner.exit()?;
        Ok(output)
    }

    /// Run `message` to completion, returning the output together with every
    /// intermediate step the run published.
    pub async fn result_with_steps<M: Serialize>(&self, message: M) -> Result<(Value, Vec<IntermediateStep>)> {
        let mut runner = self.run(message)?;
        let steps = runner.context()?.event_stream().subscribe_stream();
        let result = runner.result().await;
        let (steps, _) = steps.collect_items().await;
        let output = result?;
        runner.exit()?;
        Ok((output, steps))
    }
}

#[async_trait]
impl Function for Workflow {
    fn instance_name(&self) -> &str {
        WORKFLOW_FUNCTION_NAME
    }

    fn config(&self) -> Option<&ConfigHandle> {
        self.config.workflow.as_ref()
    }

    fn description(&self) -> Option<&str> {
        self.entry.description()
    }

    fn input_type(&self) -> &'static str {
        self.entry.input_type()
    }

    fn single_output_type(&self) -> Option<&'static str> {
        self.entry.single_output_type()
    }

    fn stream_output_type(&self) -> Option<&'static str> {
        self.entry.stream_output_type()
    }

    fn converter(&self) -> &TypeConverter {
        self.entry.converter()
    }

    async fn invoke(&self, context: &Context, input: Value) -> Result<Value> {
        self.entry.invoke(context, input).await
    }

    fn stream(&self, context: &Context, input: Value) -> Result<ValueStream> {
        self.entry.stream(context, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{FunctionArtifact, FunctionExt, PlexusError, types::IntermediateStepType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn workflow() -> Workflow {
        let entry = FunctionArtifact::callable(|x: String| async move {
            Ok::<_, PlexusError>(format!("{x}!"))
        })
        .into_function(WORKFLOW_FUNCTION_NAME, None)
        .unwrap();
        Workflow::new(WorkflowConfig::new(), entry, WorkflowComponents::default())
    }

    #[tokio::test]
    async fn test_result_as() {
        let output: String = workflow().result_as("Hello").await.unwrap();
        assert_eq!(output, "Hello!");
    }

    #[tokio::test]
    async fn test_result_with_steps() {
        let (output, steps) = workflow().result_with_steps("Hi").await.unwrap();
        assert_eq!(output, json!("Hi!"));
        let types: Vec<_> = steps.iter().map(IntermediateStep::event_type).collect();
        assert_eq!(
            types,
            vec![IntermediateStepType::FunctionStart, IntermediateStepType::FunctionEnd]
        );
        assert_eq!(steps[0].name(), Some(WORKFLOW_FUNCTION_NAME));
        assert_eq!(steps[0].function_ancestry.function_name, WORKFLOW_FUNCTION_NAME);
    }

    #[tokio::test]
    async fn test_workflow_nests_as_function() {
        let workflow = workflow();
        let context = Context::new().with_fresh_run();
        let output = workflow.ainvoke(&context, json!("nested")).await.unwrap();
        assert_eq!(output, json!("nested!"));
    }

    #[tokio::test]
    async fn test_runs_get_fresh_event_streams() {
        let workflow = workflow();
        let first = workflow.run("a").unwrap();
        let second = workflow.run("b").unwrap();
        assert!(!first.context().unwrap().event_stream().is_terminated());
        assert_eq!(first.context().unwrap().input_message(), Some(&json!("a")));
        assert_eq!(second.context().unwrap().input_message(), Some(&json!("b")));
    }
}
