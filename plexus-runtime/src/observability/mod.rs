//! Span trees built from the intermediate step stream.
//!
//! The [`ObservabilityListener`] subscribes to a run's event stream and turns
//! every START/END pair into a [`Span`]. Spans nest by the order they were
//! opened: a START opens a child of the most recently opened span that is
//! still open. Finished spans are handed to the configured
//! [`SpanExporter`]s, which must not block.

pub mod exporters;

use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

use plexus_core::{
    Context,
    context::{EventStream, Observer, Subscription},
    traits::SpanExporter,
    types::{IntermediateStep, IntermediateStepState, Span, SpanStatus},
};

pub use exporters::{InMemorySpanExporter, InMemorySpanExporterConfig, LogSpanExporter, LogSpanExporterConfig};

struct OpenSpan {
    step_id: String,
    span: Span,
}

struct SpanTree {
    trace_id: String,
    open: Vec<OpenSpan>,
    exporters: Vec<Arc<dyn SpanExporter>>,
}

impl SpanTree {
    fn export(&self, span: &Span) {
        for exporter in &self.exporters {
            exporter.export(span.clone());
        }
    }

    fn open(&mut self, step: &IntermediateStep) {
        let parent = self.open.last().map(|open| open.span.span_id.clone());
        let name = step
            .name()
            .map_or_else(|| step.event_type().to_string(), str::to_string);
        let mut span = Span::start(self.trace_id.clone(), parent, name, step.event_category());

        let ancestry = &step.function_ancestry;
        span.set_attribute("event_type", step.event_type().to_string());
        span.set_attribute("function.id", ancestry.function_id.clone());
        span.set_attribute("function.name", ancestry.function_name.clone());
        if let Some(parent_id) = &ancestry.parent_id {
            span.set_attribute("function.parent_id", parent_id.clone());
        }
        if let Some(parent_name) = &ancestry.parent_name {
            span.set_attribute("function.parent_name", parent_name.clone());
        }
        if let Some(framework) = &step.payload.framework {
            span.set_attribute("framework", framework.to_string());
        }
        if let Some(input) = step.data().and_then(|data| data.input.clone()) {
            span.set_attribute("input.value", input);
        }

        self.open.push(OpenSpan {
            step_id: step.uuid().to_string(),
            span,
        });
    }

    fn close(&mut self, step: &IntermediateStep) {
        let Some(position) = self.open.iter().rposition(|open| open.step_id == step.uuid()) else {
            warn!(
                "Received {} for step {} without a matching open span",
                step.event_type(),
                step.uuid()
            );
            return;
        };
        let OpenSpan { mut span, .. } = self.open.remove(position);

        if let Some(usage) = step.usage_info() {
            span.set_attribute("llm.token_count.prompt", usage.token_usage.prompt_tokens);
            span.set_attribute("llm.token_count.completion", usage.token_usage.completion_tokens);
            span.set_attribute("llm.token_count.total", usage.token_usage.total_tokens);
            span.set_attribute("llm.num_calls", usage.num_llm_calls);
        }
        if let Some(output) = step.data().and_then(|data| data.output.clone()) {
            span.set_attribute("output.value", output);
        }
        span.end(SpanStatus::Ok);
        self.export(&span);
    }

    fn force_close(&mut self) -> usize {
        let dangling = std::mem::take(&mut self.open);
        let count = dangling.len();
        for OpenSpan { step_id, mut span } in dangling.into_iter().rev() {
            warn!(
                "Span `{}` for step {} was never closed, closing it now",
                span.name, step_id
            );
            span.end(SpanStatus::Error("span was not closed before the run ended".to_string()));
            self.export(&span);
        }
        count
    }
}

struct SpanObserver {
    tree: Arc<Mutex<SpanTree>>,
}

impl Observer<IntermediateStep> for SpanObserver {
    fn on_next(&self, step: IntermediateStep) {
        let mut tree = self.tree.lock().unwrap_or_else(PoisonError::into_inner);
        match step.event_state() {
            IntermediateStepState::Start => tree.open(&step),
            IntermediateStepState::End => tree.close(&step),
            IntermediateStepState::Chunk => {}
        }
    }

    fn on_error(&self, error: Arc<plexus_core::PlexusError>) {
        debug!("Event stream failed: {}", error);
    }
}

/// Turns one run's intermediate steps into spans for as long as it is alive.
pub struct ObservabilityListener {
    tree: Arc<Mutex<SpanTree>>,
    event_stream: EventStream,
    subscription: Option<Subscription>,
}

impl std::fmt::Debug for ObservabilityListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tree = self.tree.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ObservabilityListener")
            .field("trace_id", &tree.trace_id)
            .field("open_spans", &tree.open.len())
            .finish_non_exhaustive()
    }
}

impl ObservabilityListener {
    /// Start listening on the event stream of `context`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(context: &Context, exporters: Vec<Arc<dyn SpanExporter>>) -> Self {
        let tree = Arc::new(Mutex::new(SpanTree {
            trace_id: Uuid::new_v4().to_string(),
            open: Vec::new(),
            exporters,
        }));
        let subscription = context.event_stream().subscribe(SpanObserver {
            tree: Arc::clone(&tree),
        });
        Self {
            tree,
            event_stream: context.event_stream().clone(),
            subscription: Some(subscription),
        }
    }

    /// Trace id shared by every span of the run.
    #[must_use]
    pub fn trace_id(&self) -> String {
        self.tree
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .trace_id
            .clone()
    }

    /// Stop listening.
    ///
    /// Waits until every step published before the stream terminated was
    /// processed, then force-closes spans that never received their END.
    /// Returns the number of spans that had to be force-closed.
    pub async fn stop(mut self) -> usize {
        let Some(subscription) = self.subscription.take() else {
            return 0;
        };
        if !self.event_stream.is_terminated() {
            subscription.unsubscribe();
        }
        subscription.finished().await;
        self.tree
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .force_close()
    }

    /// Stop on a spawned task when inside a Tokio runtime, otherwise
    /// immediately.
    pub fn stop_detached(self) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                self.stop().await;
            });
        }
    }
}

impl Drop for ObservabilityListener {
    fn drop(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        subscription.unsubscribe();
        let closed = self
            .tree
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .force_close();
        debug!("Listener dropped without stopping, {} spans force-closed", closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{
        FunctionExt, FunctionArtifact,
        types::{IntermediateStepPayload, IntermediateStepType, UsageInfo},
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_nested_functions_produce_nested_spans() {
        let exporter = InMemorySpanExporter::default();
        let context = Context::new().with_fresh_run();
        let listener = ObservabilityListener::start(&context, vec![Arc::new(exporter.clone())]);

        {
            let outer = context.push_active_function("outer", Some(json!("in")));
            let mut inner = outer.context().push_active_function("inner", None);
            inner.set_output(json!("out"));
        }
        context.event_stream().on_complete();
        assert_eq!(listener.stop().await, 0);

        let spans = exporter.spans();
        assert_eq!(spans.len(), 2);
        let (inner, outer) = (&spans[0], &spans[1]);
        assert_eq!(inner.name, "inner");
        assert_eq!(outer.name, "outer");
        assert_eq!(inner.parent_span_id.as_deref(), Some(outer.span_id.as_str()));
        assert_eq!(outer.parent_span_id, None);
        assert_eq!(inner.attributes["output.value"], json!("out"));
        assert_eq!(outer.attributes["input.value"], json!("in"));
        assert_eq!(inner.trace_id, outer.trace_id);
    }

    #[tokio::test]
    async fn test_unclosed_spans_are_force_closed() {
        let exporter = InMemorySpanExporter::default();
        let context = Context::new().with_fresh_run();
        let listener = ObservabilityListener::start(&context, vec![Arc::new(exporter.clone())]);

        context.intermediate_step_manager().push_intermediate_step(
            IntermediateStepPayload::new(IntermediateStepType::LlmStart)
                .with_uuid("dangling")
                .with_name("llm"),
        );
        context.event_stream().on_complete();

        assert_eq!(listener.stop().await, 1);
        let spans = exporter.spans();
        assert_eq!(spans.len(), 1);
        assert!(matches!(spans[0].status, SpanStatus::Error(_)));
    }

    #[tokio::test]
    async fn test_usage_attached_on_end() {
        let exporter = InMemorySpanExporter::default();
        let context = Context::new().with_fresh_run();
        let listener = ObservabilityListener::start(&context, vec![Arc::new(exporter.clone())]);
        let manager = context.intermediate_step_manager();

        manager.push_intermediate_step(
            IntermediateStepPayload::new(IntermediateStepType::LlmStart).with_uuid("call"),
        );
        let mut usage = UsageInfo::default();
        usage.token_usage.total_tokens = 42;
        manager.push_intermediate_step(
            IntermediateStepPayload::new(IntermediateStepType::LlmEnd)
                .with_uuid("call")
                .with_usage_info(usage),
        );
        context.event_stream().on_complete();
        listener.stop().await;

        let spans = exporter.spans();
        assert_eq!(spans[0].attributes["llm.token_count.total"], json!(42));
        assert_eq!(spans[0].status, SpanStatus::Ok);
    }

    #[tokio::test]
    async fn test_failed_function_still_yields_span() {
        let exporter = InMemorySpanExporter::default();
        let context = Context::new().with_fresh_run();
        let listener = ObservabilityListener::start(&context, vec![Arc::new(exporter.clone())]);

        let function = FunctionArtifact::callable(|_x: String| async move {
            Err::<String, _>(plexus_core::PlexusError::internal("boom"))
        })
        .into_function("failing", None)
        .unwrap();
        assert!(function.ainvoke(&context, json!("x")).await.is_err());
        context.event_stream().on_complete();

        assert_eq!(listener.stop().await, 0);
        assert_eq!(exporter.spans().len(), 1);
        assert!(!exporter.spans()[0].attributes.contains_key("output.value"));
    }
}
