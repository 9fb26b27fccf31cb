//! Telemetry sinks: span exporters and logging layers.

use tracing_subscriber::{Layer, Registry};

use crate::types::Span;

/// Receives spans closed by the observability listener.
///
/// `export` is called on the listener's task and must not block; exporters
/// that talk to remote backends hand spans off to their own batching task.
pub trait SpanExporter: Send + Sync + std::fmt::Debug {
    /// Accept one finished span.
    fn export(&self, span: Span);

    /// Flush anything buffered.
    fn force_flush(&self) {}

    /// Release resources. Called when the owning workflow builder exits.
    fn shutdown(&self) {}
}

/// A logging method yielded by logging builds.
pub type LoggingLayer = Box<dyn Layer<Registry> + Send + Sync>;
