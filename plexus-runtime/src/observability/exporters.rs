//! Built-in span exporters.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use plexus_core::{
    Built, PlexusError, Result, TypedConfig, TypeRegistry,
    registry::RegisteredInfo,
    traits::SpanExporter,
    types::Span,
};

/// Emits every finished span as a `tracing` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSpanExporterConfig {
    /// Include span attributes in the event
    #[serde(default)]
    pub include_attributes: bool,
}

impl TypedConfig for LogSpanExporterConfig {
    const TYPE_NAME: &'static str = "log";
    const DESCRIPTION: &'static str = "Log finished spans through tracing";
}

/// See [`LogSpanExporterConfig`].
#[derive(Debug, Clone, Default)]
pub struct LogSpanExporter {
    include_attributes: bool,
}

impl LogSpanExporter {
    /// Create an exporter.
    #[must_use]
    pub fn new(include_attributes: bool) -> Self {
        Self { include_attributes }
    }
}

impl SpanExporter for LogSpanExporter {
    fn export(&self, span: Span) {
        let duration_ms = span.duration().unwrap_or_default() * 1000.0;
        if self.include_attributes {
            info!(
                target: "plexus::spans",
                "span `{}` ({}) trace={} id={} parent={:?} status={:?} duration={:.2}ms attributes={:?}",
                span.name,
                span.kind,
                span.trace_id,
                span.span_id,
                span.parent_span_id,
                span.status,
                duration_ms,
                span.attributes
            );
        } else {
            info!(
                target: "plexus::spans",
                "span `{}` ({}) trace={} id={} parent={:?} status={:?} duration={:.2}ms",
                span.name,
                span.kind,
                span.trace_id,
                span.span_id,
                span.parent_span_id,
                span.status,
                duration_ms
            );
        }
    }
}

/// Keeps finished spans in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InMemorySpanExporterConfig {}

impl TypedConfig for InMemorySpanExporterConfig {
    const TYPE_NAME: &'static str = "memory";
    const DESCRIPTION: &'static str = "Keep finished spans in memory";
}

/// Collects spans for inspection. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<Span>>>,
}

impl InMemorySpanExporter {
    /// Every span exported so far, in export order.
    #[must_use]
    pub fn spans(&self) -> Vec<Span> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop every collected span.
    pub fn clear(&self) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&self, span: Span) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(span);
    }

    fn shutdown(&self) {
        self.clear();
    }
}

pub(crate) fn register(registry: &mut TypeRegistry) -> Result<()> {
    registry.register_telemetry_exporter(
        RegisteredInfo::telemetry_exporter(|config: Arc<LogSpanExporterConfig>, _builder| async move {
            Ok::<_, PlexusError>(Built::new(LogSpanExporter::new(config.include_attributes)))
        })
        .with_package(crate::NAME, crate::VERSION),
    )?;
    registry.register_telemetry_exporter(
        RegisteredInfo::telemetry_exporter(|_config: Arc<InMemorySpanExporterConfig>, _builder| async move {
            Ok::<_, PlexusError>(Built::new(InMemorySpanExporter::default()))
        })
        .with_package(crate::NAME, crate::VERSION),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::types::{IntermediateStepCategory, SpanStatus};

    #[test]
    fn test_in_memory_exporter_shares_buffer() {
        let exporter = InMemorySpanExporter::default();
        let handle = exporter.clone();
        let mut span = Span::start("trace", None, "step", IntermediateStepCategory::Function);
        span.end(SpanStatus::Ok);

        exporter.export(span.clone());
        assert_eq!(handle.spans(), vec![span]);

        handle.shutdown();
        assert!(exporter.spans().is_empty());
    }

    #[test]
    fn test_builtin_exporters_registered() {
        let mut registry = TypeRegistry::new();
        register(&mut registry).unwrap();
        assert_eq!(registry.get_registered_telemetry_exporters().len(), 2);
        assert!(
            registry
                .get_telemetry_exporter(plexus_core::ConfigType::of::<LogSpanExporterConfig>())
                .is_ok()
        );
    }
}
