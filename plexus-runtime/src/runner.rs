//! Single-run lifecycle around a workflow's entry function.

use futures::{StreamExt, stream::BoxStream};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, error, warn};

use plexus_core::{
    Context, Function, FunctionExt, PlexusError, Result,
    function::ValueStream,
    traits::SpanExporter,
};

use crate::observability::ObservabilityListener;

/// Lifecycle of a [`Runner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Created, not entered yet
    Uninitialized,
    /// Input bound and fresh event stream installed
    Initialized,
    /// The entry function is executing
    Running,
    /// The entry function returned successfully
    Completed,
    /// The entry function failed
    Failed,
}

impl RunnerState {
    /// Whether the run reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

type SharedState = Arc<Mutex<RunnerState>>;

fn set_state(state: &SharedState, value: RunnerState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

fn get_state(state: &SharedState) -> RunnerState {
    *state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Executes one input through the entry function.
///
/// A runner must be [entered](Runner::enter) before it produces a
/// [result](Runner::result) or a [stream](Runner::result_stream), and can
/// only be [exited](Runner::exit) once the run reached a terminal state.
/// Every run is observed by an [`ObservabilityListener`], and the run's
/// event stream is completed on success and failure alike.
pub struct Runner {
    entry: Arc<dyn Function>,
    input: Value,
    base_context: Context,
    context: Option<Context>,
    exporters: Vec<Arc<dyn SpanExporter>>,
    state: SharedState,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("entry", &self.entry.instance_name())
            .field("input", &self.input)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Create a runner for `input` on top of `context`.
    pub fn new(
        entry: Arc<dyn Function>,
        input: Value,
        context: Context,
        exporters: Vec<Arc<dyn SpanExporter>>,
    ) -> Self {
        Self {
            entry,
            input,
            base_context: context,
            context: None,
            exporters,
            state: Arc::new(Mutex::new(RunnerState::Uninitialized)),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        get_state(&self.state)
    }

    /// Bind the input, install a fresh event stream and reset the active
    /// function to the root.
    pub fn enter(&mut self) -> Result<()> {
        if self.state() != RunnerState::Uninitialized {
            return Err(PlexusError::invalid_state(
                "Cannot enter the context more than once",
            ));
        }
        self.context = Some(
            self.base_context
                .with_fresh_run()
                .with_input_message(self.input.clone()),
        );
        set_state(&self.state, RunnerState::Initialized);
        Ok(())
    }

    /// Context of the run. Subscribe to its event stream after entering and
    /// before running to observe every step.
    pub fn context(&self) -> Result<&Context> {
        self.context.as_ref().ok_or_else(|| {
            PlexusError::invalid_state("The runner has no context before it is entered")
        })
    }

    fn begin(&self, streaming: bool) -> Result<Context> {
        match self.state() {
            RunnerState::Initialized => {}
            RunnerState::Uninitialized => {
                return Err(PlexusError::invalid_state(
                    "Cannot run the workflow without entering the context",
                ));
            }
            RunnerState::Running | RunnerState::Completed | RunnerState::Failed => {
                return Err(PlexusError::invalid_state("The workflow was already run"));
            }
        }
        if streaming && !self.entry.has_streaming_output() {
            return Err(PlexusError::unsupported_output_mode(
                "Workflow does not support streaming output",
            ));
        }
        if !streaming && !self.entry.has_single_output() {
            return Err(PlexusError::unsupported_output_mode(
                "Workflow does not support single output",
            ));
        }
        let context = self.context()?.clone();
        set_state(&self.state, RunnerState::Running);
        Ok(context)
    }

    /// Run the entry function once and return its output.
    ///
    /// Dropping the returned future before it resolves fails the run: the
    /// event stream is completed and open spans are force-closed.
    pub async fn result(&mut self) -> Result<Value> {
        let context = self.begin(false)?;
        let scope = RunScope::start(context.clone(), self.exporters.clone(), &self.state);

        let result = self.entry.ainvoke(&context, self.input.clone()).await;

        let state = match &result {
            Ok(_) => RunnerState::Completed,
            Err(e) => {
                error!("Error running workflow: {}", e);
                RunnerState::Failed
            }
        };
        scope.finish(state).await;
        result
    }

    /// Run the entry function once and convert its output to `T`.
    pub async fn result_as<T: DeserializeOwned + 'static>(&mut self) -> Result<T> {
        let output = self.result().await?;
        self.convert(output)
    }

    /// Stream the entry function's output.
    ///
    /// The run completes when the stream is exhausted or yields an error.
    /// Dropping the stream early fails the run.
    pub async fn result_stream(&mut self) -> Result<ValueStream> {
        let context = self.begin(true)?;
        let scope = RunScope::start(context.clone(), self.exporters.clone(), &self.state);

        let inner = match self.entry.astream(&context, self.input.clone()) {
            Ok(inner) => inner,
            Err(e) => {
                error!("Error running workflow: {}", e);
                scope.finish(RunnerState::Failed).await;
                return Err(e);
            }
        };

        let run = StreamingRun { inner, scope };
        Ok(futures::stream::unfold(Some(run), |run| async move {
            let mut run = run?;
            match run.inner.next().await {
                Some(Ok(item)) => Some((Ok(item), Some(run))),
                Some(Err(e)) => {
                    error!("Error running workflow: {}", e);
                    run.scope.finish(RunnerState::Failed).await;
                    Some((Err(e), None))
                }
                None => {
                    run.scope.finish(RunnerState::Completed).await;
                    None
                }
            }
        })
        .boxed())
    }

    /// Stream the entry function's output, converting each item to `T`.
    pub async fn result_stream_as<T>(&mut self) -> Result<BoxStream<'static, Result<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let converter = self.entry.converter().clone();
        Ok(self
            .result_stream()
            .await?
            .map(move |item| item.and_then(|value| converter.convert::<T>(value)))
            .boxed())
    }

    /// Convert `value` with the entry function's converter.
    pub fn convert<T: DeserializeOwned + 'static>(&self, value: Value) -> Result<T> {
        self.entry.converter().convert::<T>(value)
    }

    /// Leave the run. Only allowed once the run completed or failed.
    pub fn exit(&mut self) -> Result<()> {
        let state = self.state();
        if !state.is_terminal() {
            return Err(PlexusError::invalid_state(
                "Cannot exit the context without completing the workflow",
            ));
        }
        debug!("Run finished in state {:?}", state);
        Ok(())
    }
}

struct StreamingRun {
    inner: ValueStream,
    scope: RunScope,
}

/// Observation of one run, closed on every exit path.
struct RunScope {
    context: Context,
    listener: Option<ObservabilityListener>,
    state: SharedState,
}

impl RunScope {
    fn start(context: Context, exporters: Vec<Arc<dyn SpanExporter>>, state: &SharedState) -> Self {
        let listener = ObservabilityListener::start(&context, exporters);
        Self {
            context,
            listener: Some(listener),
            state: Arc::clone(state),
        }
    }

    async fn finish(mut self, state: RunnerState) {
        self.context.event_stream().on_complete();
        if let Some(listener) = self.listener.take() {
            listener.stop().await;
        }
        set_state(&self.state, state);
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        warn!("Run was dropped before it finished");
        self.context.event_stream().on_complete();
        set_state(&self.state, RunnerState::Failed);
        listener.stop_detached();
    }
}
