//! Test components shared by the runtime integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use plexus_core::{
    Builder, BuilderExt, Built, Evaluator, EvaluatorInfo, FunctionArtifact, PlexusError, Result,
    TypeRegistry, TypedConfig,
    config::config_handle,
    registry::{RegisteredClientInfo, RegisteredFunctionInfo, RegisteredInfo},
    traits::{MemoryEditor, MemoryItem, ProviderInfo, SpanExporter},
    types::{
        ComponentRef, EvalInput, EvalOutput, EvalOutputItem, Framework, FunctionRef, LlmRef, Span,
    },
};
use plexus_runtime::observability::InMemorySpanExporter;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

pub const TEST_FRAMEWORK: &str = "test_framework";

/// Ordered record of builds and teardowns.
#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("`{entry}` not logged"))
    }
}

/// Collects formatted log output while installed as the thread's subscriber.
#[derive(Debug, Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Tracks how many runs are inside a function at once.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Appends a suffix to its input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EchoConfig {
    #[serde(default)]
    pub suffix: String,
}

impl TypedConfig for EchoConfig {
    const TYPE_NAME: &'static str = "echo";
    const DESCRIPTION: &'static str = "Echo the input";
}

/// A function that records its build and teardown and may reference other
/// components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackedConfig {
    pub tag: String,
    #[serde(default)]
    pub functions: Vec<FunctionRef>,
    #[serde(default)]
    pub llm: Option<LlmRef>,
    #[serde(default)]
    pub fail_build: bool,
    #[serde(default)]
    pub fail_teardown: bool,
}

impl TypedConfig for TrackedConfig {
    const TYPE_NAME: &'static str = "tracked";

    fn component_refs(&self) -> Vec<ComponentRef> {
        self.functions
            .iter()
            .map(FunctionRef::component_ref)
            .chain(self.llm.iter().map(LlmRef::component_ref))
            .collect()
    }
}

impl TrackedConfig {
    pub fn new(tag: &str, functions: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            functions: functions.iter().map(|name| FunctionRef::from(*name)).collect(),
            ..Self::default()
        }
    }

    pub fn with_llm(mut self, llm: &str) -> Self {
        self.llm = Some(LlmRef::from(llm));
        self
    }
}

/// Sleeps, counting concurrent callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlowConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    50
}

impl TypedConfig for SlowConfig {
    const TYPE_NAME: &'static str = "slow";
}

/// Fails for the input `"boom"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailOnBoomConfig {}

impl TypedConfig for FailOnBoomConfig {
    const TYPE_NAME: &'static str = "fail_on_boom";
}

/// An LLM provider recording its lifecycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestLlmConfig {
    #[serde(default)]
    pub model: String,
}

impl TypedConfig for TestLlmConfig {
    const TYPE_NAME: &'static str = "test_llm";
}

/// Client of [`TestLlmConfig`] for [`TEST_FRAMEWORK`].
#[derive(Debug)]
pub struct TestLlmClient {
    pub config: Arc<TestLlmConfig>,
}

/// An embedder provider recording its builds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestEmbedderConfig {
    #[serde(default)]
    pub model: String,
}

impl TypedConfig for TestEmbedderConfig {
    const TYPE_NAME: &'static str = "test_embedder";
}

/// A retriever provider recording its builds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestRetrieverConfig {
    #[serde(default)]
    pub index: String,
}

impl TypedConfig for TestRetrieverConfig {
    const TYPE_NAME: &'static str = "test_retriever";
}

/// A memory backend that keeps nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NullMemoryConfig {
    #[serde(default)]
    pub label: String,
}

impl TypedConfig for NullMemoryConfig {
    const TYPE_NAME: &'static str = "null_memory";
}

#[derive(Debug)]
struct NullMemory;

#[async_trait]
impl MemoryEditor for NullMemory {
    async fn add_items(&self, _items: Vec<MemoryItem>) -> Result<()> {
        Ok(())
    }

    async fn search(&self, _query: &str, _top_k: usize, _user_id: &str) -> Result<Vec<MemoryItem>> {
        Ok(Vec::new())
    }

    async fn remove_items(&self, _user_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Scores 1 when the output equals the expected output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExactMatchConfig {}

impl TypedConfig for ExactMatchConfig {
    const TYPE_NAME: &'static str = "exact_match";
}

/// Always fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokenEvaluatorConfig {}

impl TypedConfig for BrokenEvaluatorConfig {
    const TYPE_NAME: &'static str = "broken";
}

struct ExactMatch;

#[async_trait]
impl Evaluator for ExactMatch {
    async fn evaluate(&self, input: &EvalInput) -> Result<EvalOutput> {
        let items: Vec<EvalOutputItem> = input
            .eval_input_items
            .iter()
            .map(|item| EvalOutputItem {
                id: item.id.clone(),
                score: Value::from(u8::from(item.output_obj == item.expected_output_obj)),
                reasoning: Value::Null,
            })
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let average_score = (!items.is_empty()).then(|| {
            items.iter().filter_map(|item| item.score.as_f64()).sum::<f64>() / items.len() as f64
        });
        Ok(EvalOutput {
            average_score,
            eval_output_items: items,
        })
    }
}

struct Broken;

#[async_trait]
impl Evaluator for Broken {
    async fn evaluate(&self, _input: &EvalInput) -> Result<EvalOutput> {
        Err(PlexusError::internal("evaluator crashed"))
    }
}

/// Hands every span to a shared buffer that outlives the builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureSpansConfig {}

impl TypedConfig for CaptureSpansConfig {
    const TYPE_NAME: &'static str = "capture";
}

#[derive(Debug, Clone)]
struct CapturingExporter(InMemorySpanExporter);

impl SpanExporter for CapturingExporter {
    fn export(&self, span: Span) {
        self.0.export(span);
    }
}

/// Shared recorders the registered build functions report into.
#[derive(Debug, Clone, Default)]
pub struct Recorders {
    pub log: Log,
    pub gauge: Arc<Gauge>,
    pub spans: InMemorySpanExporter,
}

/// A registry with every test component and the built-in telemetry.
pub fn registry(recorders: &Recorders) -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    plexus_runtime::register_builtins(&mut registry).unwrap();
    register_components(&mut registry, recorders).unwrap();
    registry
}

/// Register the test components into `registry`.
pub fn register_components(registry: &mut TypeRegistry, recorders: &Recorders) -> Result<()> {
    registry
        .register_function(RegisteredFunctionInfo::new(
            |config: Arc<EchoConfig>, _builder| async move {
                let suffix = config.suffix.clone();
                Ok::<_, PlexusError>(Built::new(FunctionArtifact::callable(move |input: String| {
                    let suffix = suffix.clone();
                    async move { Ok::<_, PlexusError>(format!("{input}{suffix}")) }
                })))
            },
        ))?;

    let log = recorders.log.clone();
    registry
        .register_function(RegisteredFunctionInfo::new(
            move |config: Arc<TrackedConfig>, builder: Arc<dyn Builder>| {
                let log = log.clone();
                async move { build_tracked(config, builder, log).await }
            },
        ))?;

    let gauge = Arc::clone(&recorders.gauge);
    registry
        .register_function(RegisteredFunctionInfo::new(
            move |config: Arc<SlowConfig>, _builder| {
                let gauge = Arc::clone(&gauge);
                async move {
                    let delay = Duration::from_millis(config.delay_ms);
                    Ok::<_, PlexusError>(Built::new(FunctionArtifact::callable(
                        move |input: String| {
                            let gauge = Arc::clone(&gauge);
                            async move {
                                gauge.enter();
                                tokio::time::sleep(delay).await;
                                gauge.leave();
                                Ok::<_, PlexusError>(input)
                            }
                        },
                    )))
                }
            },
        ))?;

    registry
        .register_function(RegisteredFunctionInfo::new(
            |_config: Arc<FailOnBoomConfig>, _builder| async move {
                Ok::<_, PlexusError>(Built::new(FunctionArtifact::callable(|input: String| async move {
                    if input == "boom" {
                        anyhow::bail!("exploded on `{input}`");
                    }
                    Ok(input)
                })))
            },
        ))?;

    let log = recorders.log.clone();
    registry
        .register_llm_provider(RegisteredInfo::llm_provider(
            move |config: Arc<TestLlmConfig>, _builder| {
                let log = log.clone();
                async move {
                    log.push(format!("build llm {}", config.model));
                    let teardown_log = log.clone();
                    let model = config.model.clone();
                    Ok::<_, PlexusError>(
                        Built::new(ProviderInfo::new(config_handle((*config).clone())))
                            .with_teardown(move || async move {
                                teardown_log.push(format!("teardown llm {model}"));
                                Ok(())
                            }),
                    )
                }
            },
        ))?;

    registry
        .register_llm_client(RegisteredClientInfo::llm_client(
            TEST_FRAMEWORK,
            |config: Arc<TestLlmConfig>, _builder| async move {
                Ok::<_, PlexusError>(Built::new(TestLlmClient { config }))
            },
        ))?;

    let log = recorders.log.clone();
    registry
        .register_embedder_provider(RegisteredInfo::embedder_provider(
            move |config: Arc<TestEmbedderConfig>, _builder| {
                let log = log.clone();
                async move {
                    log.push(format!("build embedder {}", config.model));
                    Ok::<_, PlexusError>(Built::new(ProviderInfo::new(config_handle(
                        (*config).clone(),
                    ))))
                }
            },
        ))?;

    let log = recorders.log.clone();
    registry
        .register_retriever_provider(RegisteredInfo::retriever_provider(
            move |config: Arc<TestRetrieverConfig>, _builder| {
                let log = log.clone();
                async move {
                    log.push(format!("build retriever {}", config.index));
                    Ok::<_, PlexusError>(Built::new(ProviderInfo::new(config_handle(
                        (*config).clone(),
                    ))))
                }
            },
        ))?;

    let log = recorders.log.clone();
    registry
        .register_memory(RegisteredInfo::memory(
            move |config: Arc<NullMemoryConfig>, _builder| {
                let log = log.clone();
                async move {
                    log.push(format!("build memory {}", config.label));
                    Ok::<_, PlexusError>(Built::new(NullMemory))
                }
            },
        ))?;

    let spans = recorders.spans.clone();
    registry
        .register_telemetry_exporter(RegisteredInfo::telemetry_exporter(
            move |_config: Arc<CaptureSpansConfig>, _builder| {
                let exporter = CapturingExporter(spans.clone());
                async move { Ok::<_, PlexusError>(Built::new(exporter)) }
            },
        ))?;

    registry
        .register_evaluator(RegisteredInfo::evaluator(
            |config: Arc<ExactMatchConfig>, _builder| async move {
                Ok::<_, PlexusError>(Built::new(EvaluatorInfo::new(
                    config_handle((*config).clone()),
                    Arc::new(ExactMatch),
                    "Exact match",
                )))
            },
        ))?;

    registry
        .register_evaluator(RegisteredInfo::evaluator(
            |config: Arc<BrokenEvaluatorConfig>, _builder| async move {
                Ok::<_, PlexusError>(Built::new(EvaluatorInfo::new(
                    config_handle((*config).clone()),
                    Arc::new(Broken),
                    "Always fails",
                )))
            },
        ))?;

    Ok(())
}

async fn build_tracked(
    config: Arc<TrackedConfig>,
    builder: Arc<dyn Builder>,
    log: Log,
) -> Result<Built<FunctionArtifact>> {
    for dependency in &config.functions {
        builder.get_function(dependency.as_str())?;
    }
    if let Some(llm) = &config.llm {
        builder
            .get_llm_as::<TestLlmClient>(llm.as_str(), &Framework::from(TEST_FRAMEWORK))
            .await?;
    }
    if config.fail_build {
        return Err(PlexusError::internal("tracked build failed"));
    }

    let tag = config.tag.clone();
    log.push(format!("build {tag}"));

    let teardown_log = log.clone();
    let fail_teardown = config.fail_teardown;
    Ok(Built::new(FunctionArtifact::callable(|input: Value| async move {
        Ok::<_, PlexusError>(input)
    }))
    .with_teardown(move || async move {
        teardown_log.push(format!("teardown {tag}"));
        if fail_teardown {
            return Err(PlexusError::internal("teardown failed"));
        }
        Ok(())
    }))
}
