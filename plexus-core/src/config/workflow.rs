//! The declarative workflow document.
//!
//! A [`WorkflowConfig`] names every component a workflow is built from.
//! Polymorphic entries carry a `_type` tag resolved through the type
//! registry, so a document can only be parsed once the plugins providing its
//! types have registered.
//!
//! ```json
//! {
//!   "llms": { "llm1": { "_type": "test_llm" } },
//!   "functions": { "search": { "_type": "search", "llm_name": "llm1" } },
//!   "workflow": { "_type": "react_agent", "tool_names": ["search"] },
//!   "eval": { "general": { "max_concurrency": 4 } }
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::{
    source::{ConfigFormat, read_config_file},
    typed::{ConfigHandle, TypedConfig, config_handle},
};
use crate::{
    Result,
    error::PlexusError,
    registry::{ConfigAnnotation, TypeRegistry},
    types::{ComponentGroup, ComponentKind},
};

/// Named component configurations, in declaration order.
pub type ComponentMap = IndexMap<String, ConfigHandle>;

/// Logging and tracing sinks.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Logging methods by name
    pub logging: ComponentMap,
    /// Span exporters by name
    pub tracing: ComponentMap,
}

/// Settings that are not components of the workflow itself.
#[derive(Debug, Clone, Default)]
pub struct GeneralConfig {
    /// Telemetry sinks
    pub telemetry: TelemetryConfig,
    /// Front end serving the workflow
    pub front_end: Option<ConfigHandle>,
}

/// Dataset an evaluation run reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// JSON file holding an array of records
    pub file_path: PathBuf,
    /// Record key holding the item id
    pub id_key: String,
    /// Record key holding the question
    pub question_key: String,
    /// Record key holding the reference answer
    pub answer_key: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::new(),
            id_key: "id".to_string(),
            question_key: "question".to_string(),
            answer_key: "answer".to_string(),
        }
    }
}

/// Non-component evaluation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalGeneralConfig {
    /// Maximum concurrent dataset items; zero or less means unlimited
    pub max_concurrency: i64,
    /// Directory evaluation outputs are written to
    pub output_dir: PathBuf,
    /// Dataset to evaluate on
    pub dataset: Option<DatasetConfig>,
}

impl Default for EvalGeneralConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            output_dir: PathBuf::from(".tmp/plexus/eval"),
            dataset: None,
        }
    }
}

/// Evaluation section.
#[derive(Debug, Clone, Default)]
pub struct EvalConfig {
    /// Non-component settings
    pub general: EvalGeneralConfig,
    /// Evaluators by name
    pub evaluators: ComponentMap,
}

/// A full workflow document.
#[derive(Debug, Clone, Default)]
pub struct WorkflowConfig {
    /// Telemetry and front end settings
    pub general: GeneralConfig,
    /// Named functions
    pub functions: ComponentMap,
    /// Named LLM providers
    pub llms: ComponentMap,
    /// Named embedder providers
    pub embedders: ComponentMap,
    /// Named memory backends
    pub memory: ComponentMap,
    /// Named retriever providers
    pub retrievers: ComponentMap,
    /// Entry function of the workflow
    pub workflow: Option<ConfigHandle>,
    /// Evaluation settings
    pub eval: EvalConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawTelemetry {
    logging: IndexMap<String, Value>,
    tracing: IndexMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawGeneral {
    telemetry: RawTelemetry,
    front_end: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawEval {
    general: EvalGeneralConfig,
    evaluators: IndexMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawWorkflowConfig {
    general: RawGeneral,
    functions: IndexMap<String, Value>,
    llms: IndexMap<String, Value>,
    embedders: IndexMap<String, Value>,
    memory: IndexMap<String, Value>,
    retrievers: IndexMap<String, Value>,
    workflow: Option<Value>,
    eval: RawEval,
}

fn parse_map(
    registry: &TypeRegistry,
    kind: ComponentKind,
    section: &str,
    raw: IndexMap<String, Value>,
) -> Result<ComponentMap> {
    if raw.is_empty() {
        return Ok(ComponentMap::new());
    }
    let annotation = registry.compute_annotation(kind)?;
    raw.into_iter()
        .map(|(name, value)| {
            let config = parse_entry(&annotation, section, &name, value)?;
            Ok((name, config))
        })
        .collect()
}

fn parse_entry(
    annotation: &ConfigAnnotation,
    section: &str,
    name: &str,
    value: Value,
) -> Result<ConfigHandle> {
    annotation.parse(value).map_err(|e| match e {
        PlexusError::UnregisteredConfig { config_type, message } => PlexusError::UnregisteredConfig {
            config_type,
            message: format!("{message} (in `{section}.{name}`)"),
        },
        other => PlexusError::configuration(format!("Invalid `{section}.{name}`: {other}")),
    })
}

fn parse_optional(
    registry: &TypeRegistry,
    kind: ComponentKind,
    section: &str,
    name: &str,
    raw: Option<Value>,
) -> Result<Option<ConfigHandle>> {
    raw.map(|value| {
        let annotation = registry.compute_annotation(kind)?;
        parse_entry(&annotation, section, name, value)
    })
    .transpose()
}

fn echo_map(map: &ComponentMap) -> Result<Value> {
    let mut object = Map::new();
    for (name, config) in map {
        object.insert(name.clone(), config.to_value()?);
    }
    Ok(Value::Object(object))
}

impl WorkflowConfig {
    /// Empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document, resolving `_type` tags through `registry`.
    pub fn from_value(value: Value, registry: &TypeRegistry) -> Result<Self> {
        let raw: RawWorkflowConfig = serde_json::from_value(value)
            .map_err(|e| PlexusError::configuration(format!("Invalid workflow configuration: {e}")))?;

        Ok(Self {
            general: GeneralConfig {
                telemetry: TelemetryConfig {
                    logging: parse_map(
                        registry,
                        ComponentKind::Logging,
                        "general.telemetry.logging",
                        raw.general.telemetry.logging,
                    )?,
                    tracing: parse_map(
                        registry,
                        ComponentKind::Tracing,
                        "general.telemetry.tracing",
                        raw.general.telemetry.tracing,
                    )?,
                },
                front_end: parse_optional(
                    registry,
                    ComponentKind::FrontEnd,
                    "general",
                    "front_end",
                    raw.general.front_end,
                )?,
            },
            functions: parse_map(registry, ComponentKind::Function, "functions", raw.functions)?,
            llms: parse_map(registry, ComponentKind::LlmProvider, "llms", raw.llms)?,
            embedders: parse_map(
                registry,
                ComponentKind::EmbedderProvider,
                "embedders",
                raw.embedders,
            )?,
            memory: parse_map(registry, ComponentKind::Memory, "memory", raw.memory)?,
            retrievers: parse_map(
                registry,
                ComponentKind::RetrieverProvider,
                "retrievers",
                raw.retrievers,
            )?,
            workflow: parse_optional(
                registry,
                ComponentKind::Function,
                "workflow",
                "_type",
                raw.workflow,
            )?,
            eval: EvalConfig {
                general: raw.eval.general,
                evaluators: parse_map(
                    registry,
                    ComponentKind::Evaluator,
                    "eval.evaluators",
                    raw.eval.evaluators,
                )?,
            },
        })
    }

    /// Parse a JSON document.
    pub fn from_json_str(content: &str, registry: &TypeRegistry) -> Result<Self> {
        Self::from_value(ConfigFormat::Json.parse(content)?, registry)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str, registry: &TypeRegistry) -> Result<Self> {
        Self::from_value(ConfigFormat::Toml.parse(content)?, registry)
    }

    /// Read a `.json` or `.toml` document from disk.
    pub async fn from_file(path: impl AsRef<Path>, registry: &TypeRegistry) -> Result<Self> {
        Self::from_value(read_config_file(path).await?, registry)
    }

    /// Components of one named group.
    pub fn group(&self, group: ComponentGroup) -> &ComponentMap {
        match group {
            ComponentGroup::Embedders => &self.embedders,
            ComponentGroup::Functions => &self.functions,
            ComponentGroup::Llms => &self.llms,
            ComponentGroup::Memory => &self.memory,
            ComponentGroup::Retrievers => &self.retrievers,
        }
    }

    /// Echo the document with `_type` tags, in declaration order.
    pub fn to_value(&self) -> Result<Value> {
        let mut telemetry = Map::new();
        telemetry.insert("logging".to_string(), echo_map(&self.general.telemetry.logging)?);
        telemetry.insert("tracing".to_string(), echo_map(&self.general.telemetry.tracing)?);

        let mut general = Map::new();
        general.insert("telemetry".to_string(), Value::Object(telemetry));
        if let Some(front_end) = &self.general.front_end {
            general.insert("front_end".to_string(), front_end.to_value()?);
        }

        let mut eval = Map::new();
        eval.insert("general".to_string(), serde_json::to_value(&self.eval.general)?);
        eval.insert("evaluators".to_string(), echo_map(&self.eval.evaluators)?);

        let mut root = Map::new();
        root.insert("general".to_string(), Value::Object(general));
        root.insert("functions".to_string(), echo_map(&self.functions)?);
        root.insert("llms".to_string(), echo_map(&self.llms)?);
        root.insert("embedders".to_string(), echo_map(&self.embedders)?);
        root.insert("memory".to_string(), echo_map(&self.memory)?);
        root.insert("retrievers".to_string(), echo_map(&self.retrievers)?);
        if let Some(workflow) = &self.workflow {
            root.insert("workflow".to_string(), workflow.to_value()?);
        }
        root.insert("eval".to_string(), Value::Object(eval));
        Ok(Value::Object(root))
    }

    /// Set the entry function.
    #[must_use]
    pub fn with_workflow(mut self, config: impl TypedConfig) -> Self {
        self.workflow = Some(config_handle(config));
        self
    }

    /// Add a named function.
    #[must_use]
    pub fn with_function(mut self, name: impl Into<String>, config: impl TypedConfig) -> Self {
        self.functions.insert(name.into(), config_handle(config));
        self
    }

    /// Add a named LLM provider.
    #[must_use]
    pub fn with_llm(mut self, name: impl Into<String>, config: impl TypedConfig) -> Self {
        self.llms.insert(name.into(), config_handle(config));
        self
    }

    /// Add a named embedder provider.
    #[must_use]
    pub fn with_embedder(mut self, name: impl Into<String>, config: impl TypedConfig) -> Self {
        self.embedders.insert(name.into(), config_handle(config));
        self
    }

    /// Add a named memory backend.
    #[must_use]
    pub fn with_memory(mut self, name: impl Into<String>, config: impl TypedConfig) -> Self {
        self.memory.insert(name.into(), config_handle(config));
        self
    }

    /// Add a named retriever provider.
    #[must_use]
    pub fn with_retriever(mut self, name: impl Into<String>, config: impl TypedConfig) -> Self {
        self.retrievers.insert(name.into(), config_handle(config));
        self
    }

    /// Add a named evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, name: impl Into<String>, config: impl TypedConfig) -> Self {
        self.eval.evaluators.insert(name.into(), config_handle(config));
        self
    }

    /// Add a named logging method.
    #[must_use]
    pub fn with_logging(mut self, name: impl Into<String>, config: impl TypedConfig) -> Self {
        self.general.telemetry.logging.insert(name.into(), config_handle(config));
        self
    }

    /// Add a named span exporter.
    #[must_use]
    pub fn with_tracing(mut self, name: impl Into<String>, config: impl TypedConfig) -> Self {
        self.general.telemetry.tracing.insert(name.into(), config_handle(config));
        self
    }

    /// Set the evaluation output directory.
    #[must_use]
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.eval.general.output_dir = output_dir.into();
        self
    }

    /// Set the evaluation concurrency.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: i64) -> Self {
        self.eval.general.max_concurrency = max_concurrency;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ConfigType, downcast_config},
        function::FunctionArtifact,
        registry::RegisteredFunctionInfo,
        traits::Built,
        types::{ComponentRef, FunctionRef},
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct EchoConfig {
        #[serde(default)]
        uppercase: bool,
    }

    impl TypedConfig for EchoConfig {
        const TYPE_NAME: &'static str = "echo";
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct ChainConfig {
        next: Option<FunctionRef>,
    }

    impl TypedConfig for ChainConfig {
        const TYPE_NAME: &'static str = "chain";

        fn component_refs(&self) -> Vec<ComponentRef> {
            self.next.iter().map(FunctionRef::component_ref).collect()
        }
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register_function(RegisteredFunctionInfo::new(
                |_config: Arc<EchoConfig>, _builder| async move {
                    Ok::<_, PlexusError>(Built::new(FunctionArtifact::callable(|x: String| async move {
                        Ok::<_, PlexusError>(x)
                    })))
                },
            ))
            .unwrap();
        registry
            .register_function(RegisteredFunctionInfo::new(
                |_config: Arc<ChainConfig>, _builder| async move {
                    Ok::<_, PlexusError>(Built::new(FunctionArtifact::callable(|x: String| async move {
                        Ok::<_, PlexusError>(x)
                    })))
                },
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_parse_resolves_tags_in_order() {
        let config = WorkflowConfig::from_value(
            json!({
                "functions": {
                    "second": {"_type": "chain", "next": "first"},
                    "first": {"_type": "echo", "uppercase": true}
                },
                "workflow": {"_type": "echo"}
            }),
            &registry(),
        )
        .unwrap();

        let names: Vec<&str> = config.functions.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["second", "first"]);

        let first = downcast_config::<EchoConfig>(&config.functions["first"]).unwrap();
        assert!(first.uppercase);
        assert_eq!(
            config.functions["second"].component_refs(),
            vec![ComponentRef::new(ComponentGroup::Functions, "first")]
        );
        assert_eq!(
            config.workflow.as_ref().map(|w| w.config_type()),
            Some(ConfigType::of::<EchoConfig>())
        );
        assert_eq!(config.eval.general.max_concurrency, 8);
    }

    #[test]
    fn test_unknown_tag_lists_valid_names() {
        let err = WorkflowConfig::from_value(
            json!({"functions": {"f": {"_type": "missing"}}}),
            &registry(),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, PlexusError::UnregisteredConfig { .. }));
        assert!(message.contains("echo"));
        assert!(message.contains("functions.f"));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = WorkflowConfig::from_value(json!({"agents": {}}), &registry()).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_toml_document() {
        let config = WorkflowConfig::from_toml_str(
            "[workflow]\n_type = \"echo\"\n\n[eval.general]\nmax_concurrency = 2\n",
            &registry(),
        )
        .unwrap();
        assert!(config.workflow.is_some());
        assert_eq!(config.eval.general.max_concurrency, 2);
    }

    #[test]
    fn test_echo_round_trips_tags() {
        let config = WorkflowConfig::new()
            .with_function("first", EchoConfig::default())
            .with_workflow(ChainConfig {
                next: Some(FunctionRef::from("first")),
            });
        let value = config.to_value().unwrap();
        assert_eq!(
            value["functions"]["first"],
            json!({"_type": ConfigType::of::<EchoConfig>().full_type(), "uppercase": false})
        );
        assert_eq!(
            value["workflow"],
            json!({"_type": ConfigType::of::<ChainConfig>().full_type(), "next": "first"})
        );

        let reparsed = WorkflowConfig::from_value(value, &registry()).unwrap();
        assert_eq!(reparsed.to_value().unwrap(), config.to_value().unwrap());
    }

    mod shadow {
        use super::*;

        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct EchoConfig {
            pub prefix: String,
        }

        impl TypedConfig for EchoConfig {
            const TYPE_NAME: &'static str = "echo";
        }
    }

    #[test]
    fn test_echo_round_trips_colliding_short_names() {
        let mut registry = registry();
        registry
            .register_function(RegisteredFunctionInfo::new(
                |_config: Arc<shadow::EchoConfig>, _builder| async move {
                    Ok::<_, PlexusError>(Built::new(FunctionArtifact::callable(|x: String| async move {
                        Ok::<_, PlexusError>(x)
                    })))
                },
            ))
            .unwrap();

        let config = WorkflowConfig::new()
            .with_function("plain", EchoConfig { uppercase: true })
            .with_function(
                "shadowed",
                shadow::EchoConfig {
                    prefix: ">".to_string(),
                },
            );

        let reparsed = WorkflowConfig::from_value(config.to_value().unwrap(), &registry).unwrap();
        assert!(downcast_config::<EchoConfig>(&reparsed.functions["plain"]).unwrap().uppercase);
        assert_eq!(
            downcast_config::<shadow::EchoConfig>(&reparsed.functions["shadowed"])
                .unwrap()
                .prefix,
            ">"
        );

        let err = WorkflowConfig::from_value(
            json!({"functions": {"f": {"_type": "echo"}}}),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, PlexusError::UnregisteredConfig { .. }));
    }
}
