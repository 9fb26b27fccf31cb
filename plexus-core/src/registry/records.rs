//! Registration records, one per component kind.
//!
//! A record ties a configuration type to the build function that turns a
//! configuration of that type into a runtime object. Build functions are
//! stored type-erased; the typed constructors below downcast the incoming
//! [`ConfigHandle`] back to the registered type before calling the plugin.

use futures::{
    FutureExt,
    future::{self, BoxFuture},
};
use serde_json::Value;
use std::{any::Any, fmt, future::Future, ops::Deref, sync::Arc};

use crate::{
    Result,
    config::{
        ConfigHandle, ConfigType, TypedConfig, WorkflowConfig, downcast_config,
        typed::deserialize_config,
    },
    error::PlexusError,
    function::{Function, FunctionArtifact},
    traits::{
        Builder, Built, ClientHandle, EvalBuilder, EvaluatorInfo, FrontEnd, LoggingLayer,
        MemoryEditor, ProviderInfo, RegistryHandler, SpanExporter, ToolHandle,
    },
    types::{ComponentKind, DiscoveryMetadata, Framework},
};

/// Future returned by type-erased build functions.
pub type BuildFuture<T> = BoxFuture<'static, Result<Built<T>>>;

/// Type-erased build function receiving the workflow builder.
pub type BuildFn<T> = Arc<dyn Fn(ConfigHandle, Arc<dyn Builder>) -> BuildFuture<T> + Send + Sync>;

/// Type-erased evaluator build function.
pub type EvaluatorBuildFn =
    Arc<dyn Fn(ConfigHandle, Arc<dyn EvalBuilder>) -> BuildFuture<EvaluatorInfo> + Send + Sync>;

/// Type-erased front end build function, receiving the full configuration.
pub type FrontEndBuildFn =
    Arc<dyn Fn(ConfigHandle, Arc<WorkflowConfig>) -> BuildFuture<Arc<dyn FrontEnd>> + Send + Sync>;

/// Type-erased registry handler build function.
pub type RegistryHandlerBuildFn =
    Arc<dyn Fn(ConfigHandle) -> BuildFuture<Arc<dyn RegistryHandler>> + Send + Sync>;

/// Synchronous tool wrapper build function.
pub type ToolWrapperBuildFn =
    Arc<dyn Fn(&str, Arc<dyn Function>, &dyn Builder) -> Result<ToolHandle> + Send + Sync>;

pub(crate) type DeserializeFn = fn(Value) -> Result<ConfigHandle>;

fn typed_config<C: TypedConfig>(config: &ConfigHandle) -> Result<Arc<C>> {
    downcast_config::<C>(config).ok_or_else(|| {
        PlexusError::internal(format!(
            "Build function for `{}` received a `{}` config",
            ConfigType::of::<C>(),
            config.config_type()
        ))
    })
}

fn erase<C, B, T, U, E, F, Fut>(
    build: F,
    wrap: fn(T) -> U,
) -> Arc<dyn Fn(ConfigHandle, Arc<B>) -> BuildFuture<U> + Send + Sync>
where
    C: TypedConfig,
    B: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    U: Send + 'static,
    E: Into<PlexusError> + 'static,
    F: Fn(Arc<C>, Arc<B>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Built<T>, E>> + Send + 'static,
{
    Arc::new(move |config, builder| match typed_config::<C>(&config) {
        Ok(config) => build(config, builder)
            .map(move |built| {
                built
                    .map(|built| built.map(wrap))
                    .map_err(Into::<PlexusError>::into)
            })
            .boxed(),
        Err(e) => future::ready(Err(e)).boxed(),
    })
}

/// Registration of a configuration type for one component kind.
#[derive(Clone)]
pub struct RegisteredInfo<F> {
    /// `<module>/<local_name>` of the configuration type
    pub full_type: String,
    /// The configuration type
    pub config_type: ConfigType,
    /// Metadata surfaced through discovery
    pub discovery_metadata: DiscoveryMetadata,
    /// Build function
    pub build_fn: F,
    deserialize: DeserializeFn,
}

impl<F> fmt::Debug for RegisteredInfo<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredInfo")
            .field("full_type", &self.full_type)
            .field("discovery_metadata", &self.discovery_metadata)
            .finish_non_exhaustive()
    }
}

impl<F> RegisteredInfo<F> {
    fn from_build_fn<C: TypedConfig>(kind: ComponentKind, build_fn: F) -> Self {
        let config_type = ConfigType::of::<C>();
        Self {
            full_type: config_type.full_type(),
            config_type,
            discovery_metadata: DiscoveryMetadata::for_config(
                kind,
                config_type.local_name(),
                config_type.description(),
            ),
            build_fn,
            deserialize: deserialize_config::<C>,
        }
    }

    /// Short name of the configuration type.
    pub fn local_name(&self) -> &'static str {
        self.config_type.local_name()
    }

    /// Record the package the registration comes from.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>, version: impl Into<String>) -> Self {
        self.discovery_metadata = self.discovery_metadata.with_package(package, version);
        self
    }

    /// Replace the discovery metadata.
    #[must_use]
    pub fn with_discovery_metadata(mut self, discovery_metadata: DiscoveryMetadata) -> Self {
        self.discovery_metadata = discovery_metadata;
        self
    }

    /// Deserialize an untagged configuration of the registered type.
    pub fn deserialize(&self, value: Value) -> Result<ConfigHandle> {
        (self.deserialize)(value)
    }

    pub(crate) fn deserialize_fn(&self) -> DeserializeFn {
        self.deserialize
    }
}

impl<T: Send + 'static> RegisteredInfo<BuildFn<T>> {
    fn erased<C, R, E, F, Fut>(kind: ComponentKind, build: F, wrap: fn(R) -> T) -> Self
    where
        C: TypedConfig,
        R: Send + 'static,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<R>, E>> + Send + 'static,
    {
        Self::from_build_fn::<C>(kind, erase(build, wrap))
    }
}

impl RegisteredInfo<BuildFn<ProviderInfo>> {
    /// Register an LLM provider.
    pub fn llm_provider<C, E, F, Fut>(build: F) -> Self
    where
        C: TypedConfig,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<ProviderInfo>, E>> + Send + 'static,
    {
        Self::erased(ComponentKind::LlmProvider, build, std::convert::identity)
    }

    /// Register an embedder provider.
    pub fn embedder_provider<C, E, F, Fut>(build: F) -> Self
    where
        C: TypedConfig,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<ProviderInfo>, E>> + Send + 'static,
    {
        Self::erased(ComponentKind::EmbedderProvider, build, std::convert::identity)
    }

    /// Register a retriever provider.
    pub fn retriever_provider<C, E, F, Fut>(build: F) -> Self
    where
        C: TypedConfig,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<ProviderInfo>, E>> + Send + 'static,
    {
        Self::erased(ComponentKind::RetrieverProvider, build, std::convert::identity)
    }
}

impl RegisteredInfo<BuildFn<Arc<dyn MemoryEditor>>> {
    /// Register a memory backend.
    pub fn memory<C, M, E, F, Fut>(build: F) -> Self
    where
        C: TypedConfig,
        M: MemoryEditor + 'static,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<M>, E>> + Send + 'static,
    {
        Self::erased(ComponentKind::Memory, build, |memory| {
            Arc::new(memory) as Arc<dyn MemoryEditor>
        })
    }
}

impl RegisteredInfo<BuildFn<LoggingLayer>> {
    /// Register a logging method.
    pub fn logging_method<C, E, F, Fut>(build: F) -> Self
    where
        C: TypedConfig,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<LoggingLayer>, E>> + Send + 'static,
    {
        Self::erased(ComponentKind::Logging, build, std::convert::identity)
    }
}

impl RegisteredInfo<BuildFn<Arc<dyn SpanExporter>>> {
    /// Register a telemetry exporter.
    pub fn telemetry_exporter<C, X, E, F, Fut>(build: F) -> Self
    where
        C: TypedConfig,
        X: SpanExporter + 'static,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<X>, E>> + Send + 'static,
    {
        Self::erased(ComponentKind::Tracing, build, |exporter| {
            Arc::new(exporter) as Arc<dyn SpanExporter>
        })
    }
}

impl RegisteredInfo<EvaluatorBuildFn> {
    /// Register an evaluator.
    pub fn evaluator<C, E, F, Fut>(build: F) -> Self
    where
        C: TypedConfig,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn EvalBuilder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<EvaluatorInfo>, E>> + Send + 'static,
    {
        Self::from_build_fn::<C>(
            ComponentKind::Evaluator,
            erase(build, std::convert::identity),
        )
    }
}

impl RegisteredInfo<FrontEndBuildFn> {
    /// Register a front end.
    pub fn front_end<C, X, E, F, Fut>(build: F) -> Self
    where
        C: TypedConfig,
        X: FrontEnd + 'static,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<WorkflowConfig>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<X>, E>> + Send + 'static,
    {
        Self::from_build_fn::<C>(
            ComponentKind::FrontEnd,
            erase(build, |front_end| Arc::new(front_end) as Arc<dyn FrontEnd>),
        )
    }
}

impl RegisteredInfo<RegistryHandlerBuildFn> {
    /// Register a registry handler.
    pub fn registry_handler<C, X, E, F, Fut>(build: F) -> Self
    where
        C: TypedConfig,
        X: RegistryHandler + 'static,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<X>, E>> + Send + 'static,
    {
        let build_fn: RegistryHandlerBuildFn =
            Arc::new(move |config| match typed_config::<C>(&config) {
                Ok(config) => build(config)
                    .map(|built| {
                        built
                            .map(|built| {
                                built.map(|handler| Arc::new(handler) as Arc<dyn RegistryHandler>)
                            })
                            .map_err(Into::<PlexusError>::into)
                    })
                    .boxed(),
                Err(e) => future::ready(Err(e)).boxed(),
            });
        Self::from_build_fn::<C>(ComponentKind::RegistryHandler, build_fn)
    }
}

/// Registration of a function.
#[derive(Debug, Clone)]
pub struct RegisteredFunctionInfo {
    /// Common registration fields
    pub info: RegisteredInfo<BuildFn<FunctionArtifact>>,
    /// Frameworks the function is known to work with
    pub framework_wrappers: Vec<Framework>,
}

impl RegisteredFunctionInfo {
    /// Register a function.
    pub fn new<C, E, F, Fut>(build: F) -> Self
    where
        C: TypedConfig,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<FunctionArtifact>, E>> + Send + 'static,
    {
        Self {
            info: RegisteredInfo::erased(ComponentKind::Function, build, std::convert::identity),
            framework_wrappers: Vec::new(),
        }
    }

    /// Declare the frameworks the function works with.
    #[must_use]
    pub fn with_framework_wrappers(mut self, framework_wrappers: Vec<Framework>) -> Self {
        self.framework_wrappers = framework_wrappers;
        self
    }

    /// Record the package the registration comes from.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>, version: impl Into<String>) -> Self {
        self.info = self.info.with_package(package, version);
        self
    }
}

impl Deref for RegisteredFunctionInfo {
    type Target = RegisteredInfo<BuildFn<FunctionArtifact>>;

    fn deref(&self) -> &Self::Target {
        &self.info
    }
}

/// Registration of a framework-specific client for a provider config type.
///
/// LLM and embedder clients are keyed by a framework; retriever clients may
/// also be registered framework-agnostic (`None`).
#[derive(Debug, Clone)]
pub struct RegisteredClientInfo<K> {
    /// Common registration fields; the config type is the provider's
    pub info: RegisteredInfo<BuildFn<ClientHandle>>,
    /// Framework the client targets
    pub framework: K,
}

impl<K> RegisteredClientInfo<K> {
    fn erased<C, T, E, F, Fut>(kind: ComponentKind, framework: K, label: &str, build: F) -> Self
    where
        C: TypedConfig,
        T: Any + Send + Sync,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<T>, E>> + Send + 'static,
    {
        let mut info = RegisteredInfo::<BuildFn<ClientHandle>>::erased(kind, build, |client| {
            Arc::new(client) as ClientHandle
        });
        info.discovery_metadata.component_name =
            format!("{} ({label})", info.config_type.local_name());
        Self { info, framework }
    }

    /// Record the package the registration comes from.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>, version: impl Into<String>) -> Self {
        self.info = self.info.with_package(package, version);
        self
    }
}

impl RegisteredClientInfo<Framework> {
    /// Register an LLM client of provider config `C` for `framework`.
    pub fn llm_client<C, T, E, F, Fut>(framework: impl Into<Framework>, build: F) -> Self
    where
        C: TypedConfig,
        T: Any + Send + Sync,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<T>, E>> + Send + 'static,
    {
        let framework = framework.into();
        let label = framework.to_string();
        Self::erased(ComponentKind::LlmClient, framework, &label, build)
    }

    /// Register an embedder client of provider config `C` for `framework`.
    pub fn embedder_client<C, T, E, F, Fut>(framework: impl Into<Framework>, build: F) -> Self
    where
        C: TypedConfig,
        T: Any + Send + Sync,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<T>, E>> + Send + 'static,
    {
        let framework = framework.into();
        let label = framework.to_string();
        Self::erased(ComponentKind::EmbedderClient, framework, &label, build)
    }
}

impl RegisteredClientInfo<Option<Framework>> {
    /// Register a retriever client of provider config `C`; `None` registers
    /// the framework-agnostic client.
    pub fn retriever_client<C, T, E, F, Fut>(framework: Option<Framework>, build: F) -> Self
    where
        C: TypedConfig,
        T: Any + Send + Sync,
        E: Into<PlexusError> + 'static,
        F: Fn(Arc<C>, Arc<dyn Builder>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Built<T>, E>> + Send + 'static,
    {
        let label = framework.as_ref().map_or_else(|| "any".to_string(), ToString::to_string);
        Self::erased(ComponentKind::RetrieverClient, framework, &label, build)
    }
}

impl<K> Deref for RegisteredClientInfo<K> {
    type Target = RegisteredInfo<BuildFn<ClientHandle>>;

    fn deref(&self) -> &Self::Target {
        &self.info
    }
}

/// Registration of a tool wrapper, keyed by framework only.
#[derive(Clone)]
pub struct RegisteredToolWrapper {
    /// Framework the tools are built for
    pub framework: Framework,
    /// Metadata surfaced through discovery
    pub discovery_metadata: DiscoveryMetadata,
    /// Wrap a function into a tool
    pub build_fn: ToolWrapperBuildFn,
}

impl fmt::Debug for RegisteredToolWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredToolWrapper")
            .field("framework", &self.framework)
            .field("discovery_metadata", &self.discovery_metadata)
            .finish_non_exhaustive()
    }
}

impl RegisteredToolWrapper {
    /// Register a tool wrapper for `framework`.
    pub fn new<T, E, F>(framework: impl Into<Framework>, build: F) -> Self
    where
        T: Any + Send + Sync,
        E: Into<PlexusError>,
        F: Fn(&str, Arc<dyn Function>, &dyn Builder) -> std::result::Result<T, E>
            + Send
            + Sync
            + 'static,
    {
        let framework = framework.into();
        Self {
            discovery_metadata: DiscoveryMetadata::for_tool_wrapper(&framework),
            framework,
            build_fn: Arc::new(
                move |name: &str, function: Arc<dyn Function>, builder: &dyn Builder| {
                    build(name, function, builder)
                        .map(|tool| Arc::new(tool) as ToolHandle)
                        .map_err(Into::<PlexusError>::into)
                },
            ),
        }
    }
}

/// An installed plugin package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredPackage {
    /// Package name
    pub package_name: String,
    /// Metadata surfaced through discovery
    pub discovery_metadata: DiscoveryMetadata,
}

/// LLM provider registration.
pub type RegisteredLlmProviderInfo = RegisteredInfo<BuildFn<ProviderInfo>>;
/// Embedder provider registration.
pub type RegisteredEmbedderProviderInfo = RegisteredInfo<BuildFn<ProviderInfo>>;
/// Retriever provider registration.
pub type RegisteredRetrieverProviderInfo = RegisteredInfo<BuildFn<ProviderInfo>>;
/// LLM client registration.
pub type RegisteredLlmClientInfo = RegisteredClientInfo<Framework>;
/// Embedder client registration.
pub type RegisteredEmbedderClientInfo = RegisteredClientInfo<Framework>;
/// Retriever client registration.
pub type RegisteredRetrieverClientInfo = RegisteredClientInfo<Option<Framework>>;
/// Memory registration.
pub type RegisteredMemoryInfo = RegisteredInfo<BuildFn<Arc<dyn MemoryEditor>>>;
/// Evaluator registration.
pub type RegisteredEvaluatorInfo = RegisteredInfo<EvaluatorBuildFn>;
/// Logging method registration.
pub type RegisteredLoggingMethod = RegisteredInfo<BuildFn<LoggingLayer>>;
/// Telemetry exporter registration.
pub type RegisteredTelemetryExporter = RegisteredInfo<BuildFn<Arc<dyn SpanExporter>>>;
/// Front end registration.
pub type RegisteredFrontEndInfo = RegisteredInfo<FrontEndBuildFn>;
/// Registry handler registration.
pub type RegisteredRegistryHandlerInfo = RegisteredInfo<RegistryHandlerBuildFn>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_handle;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct WordsConfig {
        words: Vec<String>,
    }

    impl TypedConfig for WordsConfig {
        const TYPE_NAME: &'static str = "words";
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct OtherConfig {}

    impl TypedConfig for OtherConfig {
        const TYPE_NAME: &'static str = "other";
    }

    fn double(count: usize) -> usize {
        count * 2
    }

    #[tokio::test]
    async fn test_erased_build_runs_on_a_spawned_task() {
        let build = erase(
            |config: Arc<WordsConfig>, _scope: Arc<()>| async move {
                tokio::task::yield_now().await;
                Ok::<_, PlexusError>(Built::new(config.words.len()))
            },
            double,
        );

        let config = config_handle(WordsConfig {
            words: vec!["a".to_string(), "b".to_string()],
        });
        let built = tokio::spawn(build(config, Arc::new(()))).await.unwrap().unwrap();
        let (count, teardown) = built.into_parts();
        assert_eq!(count, 4);
        assert!(teardown.is_none());

        let err = tokio::spawn(build(config_handle(OtherConfig {}), Arc::new(())))
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("words"));
    }
}
