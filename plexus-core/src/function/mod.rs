//! The uniform runnable abstraction.
//!
//! Every tool, agent and workflow step is a [`Function`]: a named object with
//! a single-shot and/or a streaming invocation mode over JSON values. Plugin
//! builds yield a [`FunctionArtifact`] which the workflow builder normalizes
//! into a `Function`. Callers go through [`FunctionExt`], which wraps each
//! invocation in a FUNCTION_START/FUNCTION_END scope on the run's event
//! stream and converts values to the requested Rust types.

pub mod converter;
pub mod info;
pub mod lambda;

use async_trait::async_trait;
use futures::{FutureExt, Stream, StreamExt, future::BoxFuture};
use pin_project::pin_project;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    fmt,
    pin::Pin,
    task::{Context as TaskContext, Poll},
};

use crate::{
    Result,
    config::ConfigHandle,
    context::{ActiveFunctionGuard, Context},
    error::PlexusError,
};

pub use converter::TypeConverter;
pub use info::{Callable, FunctionArtifact, FunctionInfo, SingleFn, StreamFn, ValueStream};
pub use lambda::LambdaFunction;

/// A runnable component.
#[async_trait]
pub trait Function: Send + Sync + fmt::Debug {
    /// Name the function was added under.
    fn instance_name(&self) -> &str;

    /// Configuration the function was built from.
    fn config(&self) -> Option<&ConfigHandle> {
        None
    }

    /// Description shown to agents and tooling.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Declared input type.
    fn input_type(&self) -> &'static str;

    /// Declared single-shot output type, if supported.
    fn single_output_type(&self) -> Option<&'static str> {
        None
    }

    /// Declared streaming output type, if supported.
    fn stream_output_type(&self) -> Option<&'static str> {
        None
    }

    /// Whether [`Function::invoke`] is supported.
    fn has_single_output(&self) -> bool {
        self.single_output_type().is_some()
    }

    /// Whether [`Function::stream`] is supported.
    fn has_streaming_output(&self) -> bool {
        self.stream_output_type().is_some()
    }

    /// Conversions available for this function's values.
    fn converter(&self) -> &TypeConverter;

    /// Run the single-shot body. Called through [`FunctionExt::ainvoke`].
    async fn invoke(&self, _context: &Context, _input: Value) -> Result<Value> {
        Err(PlexusError::unsupported_output_mode(format!(
            "Function `{}` does not support single output",
            self.instance_name()
        )))
    }

    /// Start the streaming body. Called through [`FunctionExt::astream`].
    fn stream(&self, _context: &Context, _input: Value) -> Result<ValueStream> {
        Err(PlexusError::unsupported_output_mode(format!(
            "Function `{}` does not support streaming output",
            self.instance_name()
        )))
    }
}

/// Instrumented entry points over any [`Function`].
pub trait FunctionExt: Function {
    /// Invoke the function once inside its own active-function scope.
    fn ainvoke<'a>(&'a self, context: &'a Context, input: Value) -> BoxFuture<'a, Result<Value>> {
        async move {
            let mut guard = context.push_active_function(self.instance_name(), Some(input.clone()));
            let output = self.invoke(guard.context(), input).await?;
            guard.set_output(output.clone());
            Ok(output)
        }
        .boxed()
    }

    /// Invoke the function, converting the input from and the output to
    /// concrete types.
    fn ainvoke_as<'a, I, O>(&'a self, context: &'a Context, input: I) -> BoxFuture<'a, Result<O>>
    where
        I: Serialize,
        O: DeserializeOwned + Send + 'static,
    {
        let input = serde_json::to_value(input).map_err(PlexusError::from);
        async move {
            let output = self.ainvoke(context, input?).await?;
            self.converter().convert::<O>(output)
        }
        .boxed()
    }

    /// Stream the function inside its own active-function scope.
    ///
    /// FUNCTION_END is published once the stream is exhausted or dropped,
    /// carrying every item yielded so far.
    fn astream(&self, context: &Context, input: Value) -> Result<ValueStream> {
        let guard = context.push_active_function(self.instance_name(), Some(input.clone()));
        let inner = self.stream(guard.context(), input)?;
        Ok(InstrumentedStream {
            inner,
            guard: Some(guard),
            outputs: Vec::new(),
        }
        .boxed())
    }

    /// Stream the function, converting each item to `O`.
    fn astream_as<O>(&self, context: &Context, input: Value) -> Result<futures::stream::BoxStream<'static, Result<O>>>
    where
        O: DeserializeOwned + Send + 'static,
    {
        let converter = self.converter().clone();
        Ok(self
            .astream(context, input)?
            .map(move |item| item.and_then(|value| converter.convert::<O>(value)))
            .boxed())
    }
}

impl<F: Function + ?Sized> FunctionExt for F {}

#[pin_project]
struct InstrumentedStream {
    #[pin]
    inner: ValueStream,
    guard: Option<ActiveFunctionGuard>,
    outputs: Vec<Value>,
}

impl Stream for InstrumentedStream {
    type Item = Result<Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let polled = this.inner.poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(value))) => this.outputs.push(value.clone()),
            Poll::Ready(None) => {
                if let Some(mut guard) = this.guard.take() {
                    guard.set_output(Value::Array(std::mem::take(this.outputs)));
                }
            }
            Poll::Ready(Some(Err(_))) | Poll::Pending => {}
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntermediateStepType;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn upper() -> LambdaFunction {
        let info = FunctionInfo::from_fn(|x: String| async move { Ok::<_, PlexusError>(x.to_uppercase()) })
            .with_stream_fn(|x: String| {
                stream::iter(x.chars().map(|c| Ok::<_, PlexusError>(c.to_string())).collect::<Vec<_>>())
            });
        LambdaFunction::new("upper", None, info).unwrap()
    }

    #[tokio::test]
    async fn test_ainvoke_publishes_scope() {
        let context = Context::new().with_fresh_run();
        let events = context.event_stream().subscribe_stream();

        let output: String = upper().ainvoke_as(&context, "abc").await.unwrap();
        assert_eq!(output, "ABC");
        context.event_stream().on_complete();

        let (steps, _) = events.collect_items().await;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name(), Some("upper"));
        assert_eq!(steps[1].event_type(), IntermediateStepType::FunctionEnd);
        assert_eq!(steps[1].data().unwrap().output, Some(json!("ABC")));
    }

    #[tokio::test]
    async fn test_astream_closes_scope_when_exhausted() {
        let context = Context::new().with_fresh_run();
        let events = context.event_stream().subscribe_stream();

        let items: Vec<String> = upper()
            .astream_as(&context, json!("ab"))
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec!["A".to_string(), "B".to_string()]);
        context.event_stream().on_complete();

        let (steps, _) = events.collect_items().await;
        assert_eq!(steps.last().unwrap().event_type(), IntermediateStepType::FunctionEnd);
        assert_eq!(steps.last().unwrap().data().unwrap().output, Some(json!(["A", "B"])));
    }

    #[tokio::test]
    async fn test_unsupported_mode_still_closes_scope() {
        let info = FunctionInfo::from_fn(|x: u32| async move { Ok::<_, PlexusError>(x) });
        let function = LambdaFunction::new("single", None, info).unwrap();
        let context = Context::new();
        let events = context.event_stream().subscribe_stream();

        let err = function.astream(&context, json!(1)).err().unwrap();
        assert!(matches!(err, PlexusError::UnsupportedOutputMode { .. }));
        context.event_stream().on_complete();

        let (steps, _) = events.collect_items().await;
        let types: Vec<_> = steps.iter().map(|s| s.event_type()).collect();
        assert_eq!(
            types,
            vec![IntermediateStepType::FunctionStart, IntermediateStepType::FunctionEnd]
        );
    }

    #[tokio::test]
    async fn test_conversion_to_string() {
        let info = FunctionInfo::from_fn(|x: u32| async move { Ok::<_, PlexusError>(x + 1) });
        let function = LambdaFunction::new("inc", None, info).unwrap();
        let output: String = function.ainvoke_as(&Context::new(), 41).await.unwrap();
        assert_eq!(output, "42");
    }
}
