//! The type registry.
//!
//! The registry maps configuration types (and, for client kinds, a target
//! framework) to the build functions plugins registered for them. It is
//! populated while plugins load and read by the workflow builder and the
//! configuration parser afterwards.

pub mod global;
pub mod records;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    ops::{Deref, DerefMut},
    sync::Arc,
};
use tracing::{debug, info};

use crate::{
    Result,
    config::{ConfigHandle, ConfigType, TYPE_TAG},
    error::PlexusError,
    types::{ComponentKind, DiscoveryMetadata, Framework},
};

pub use global::{GlobalTypeRegistry, RegistryOverride};
pub use records::*;

use records::DeserializeFn;

/// Callback fired whenever the set of registrations changes.
pub type RegistrationHook = Arc<dyn Fn() + Send + Sync>;

fn key_list<'a, I, K>(keys: I) -> String
where
    I: IntoIterator<Item = &'a K>,
    K: fmt::Display + 'a,
{
    let keys: Vec<String> = keys.into_iter().map(ToString::to_string).collect();
    format!("[{}]", keys.join(", "))
}

fn insert_unique<K, V>(map: &mut IndexMap<K, V>, key: K, value: V, kind: &str, label: String) -> Result<()>
where
    K: Hash + Eq,
{
    if map.contains_key(&key) {
        return Err(PlexusError::duplicate_registration(kind, label));
    }
    map.insert(key, value);
    Ok(())
}

fn disjoint<K, V>(
    target: &IndexMap<K, V>,
    source: &IndexMap<K, V>,
    kind: &str,
    label: impl Fn(&K) -> String,
) -> Result<()>
where
    K: Hash + Eq,
{
    match source.keys().find(|key| target.contains_key(*key)) {
        Some(key) => Err(PlexusError::duplicate_registration(kind, label(key))),
        None => Ok(()),
    }
}

fn lookup<'a, V>(map: &'a IndexMap<ConfigType, V>, config_type: ConfigType, what: &str) -> Result<&'a V> {
    map.get(&config_type).ok_or_else(|| {
        PlexusError::not_found(format!(
            "Could not find a registered {what} for config `{config_type}`. Registered configs: {}",
            key_list(map.keys())
        ))
    })
}

/// Tags a polymorphic configuration entry may carry for one component kind.
///
/// Every registration is reachable under its full type. A registration whose
/// short name is unique among the registrations of its kind is also
/// reachable under the short name.
#[derive(Clone)]
pub struct ConfigAnnotation {
    kind: ComponentKind,
    tags: IndexMap<String, (ConfigType, DeserializeFn)>,
}

impl fmt::Debug for ConfigAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigAnnotation")
            .field("kind", &self.kind)
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConfigAnnotation {
    fn from_records<'a, F: 'a>(
        kind: ComponentKind,
        records: impl IntoIterator<Item = &'a RegisteredInfo<F>>,
    ) -> Self {
        let records: Vec<(ConfigType, DeserializeFn)> = records
            .into_iter()
            .map(|record| (record.config_type, record.deserialize_fn()))
            .collect();

        let mut short_names: HashMap<&'static str, usize> = HashMap::new();
        for (config_type, _) in &records {
            *short_names.entry(config_type.local_name()).or_default() += 1;
        }

        let mut tags = IndexMap::new();
        for (config_type, deserialize) in &records {
            tags.insert(config_type.full_type(), (*config_type, *deserialize));
        }
        for (config_type, deserialize) in &records {
            if short_names.get(config_type.local_name()) == Some(&1) {
                tags.insert(config_type.local_name().to_string(), (*config_type, *deserialize));
            }
        }

        Self { kind, tags }
    }

    /// Component kind the annotation was computed for.
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Every valid tag.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    /// Configuration type selected by `tag`.
    pub fn resolve(&self, tag: &str) -> Result<ConfigType> {
        self.entry(tag).map(|(config_type, _)| *config_type)
    }

    fn entry(&self, tag: &str) -> Result<&(ConfigType, DeserializeFn)> {
        self.tags.get(tag).ok_or_else(|| {
            PlexusError::unregistered_config(
                tag,
                format!(
                    "No {} is registered under this name. Valid names: {}",
                    self.kind,
                    key_list(self.tags.keys())
                ),
            )
        })
    }

    /// Parse a tagged configuration entry.
    pub fn parse(&self, value: Value) -> Result<ConfigHandle> {
        let Value::Object(mut map) = value else {
            return Err(PlexusError::configuration(format!(
                "Expected a {} configuration object, got `{value}`",
                self.kind
            )));
        };
        let tag = match map.remove(TYPE_TAG) {
            Some(Value::String(tag)) => tag,
            Some(other) => {
                return Err(PlexusError::configuration(format!(
                    "`{TYPE_TAG}` must be a string, got `{other}`"
                )));
            }
            None => {
                return Err(PlexusError::configuration(format!(
                    "Missing `{TYPE_TAG}` in {} configuration. Valid names: {}",
                    self.kind,
                    key_list(self.tags.keys())
                )));
            }
        };
        let (config_type, deserialize) = self.entry(&tag)?;
        deserialize(Value::Object(map)).map_err(|e| {
            PlexusError::configuration(format!("Invalid `{config_type}` configuration: {e}"))
        })
    }
}

/// Catalog of registered component types.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    front_ends: IndexMap<ConfigType, RegisteredFrontEndInfo>,
    functions: IndexMap<ConfigType, RegisteredFunctionInfo>,
    tool_wrappers: IndexMap<Framework, RegisteredToolWrapper>,
    llm_providers: IndexMap<ConfigType, RegisteredLlmProviderInfo>,
    llm_clients: IndexMap<(ConfigType, Framework), RegisteredLlmClientInfo>,
    embedder_providers: IndexMap<ConfigType, RegisteredEmbedderProviderInfo>,
    embedder_clients: IndexMap<(ConfigType, Framework), RegisteredEmbedderClientInfo>,
    evaluators: IndexMap<ConfigType, RegisteredEvaluatorInfo>,
    memory: IndexMap<ConfigType, RegisteredMemoryInfo>,
    retriever_providers: IndexMap<ConfigType, RegisteredRetrieverProviderInfo>,
    retriever_clients: IndexMap<(ConfigType, Option<Framework>), RegisteredRetrieverClientInfo>,
    registry_handlers: IndexMap<ConfigType, RegisteredRegistryHandlerInfo>,
    logging_methods: IndexMap<ConfigType, RegisteredLoggingMethod>,
    telemetry_exporters: IndexMap<ConfigType, RegisteredTelemetryExporter>,
    packages: IndexMap<String, RegisteredPackage>,
    hooks: Vec<RegistrationHook>,
    hooks_paused: usize,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("functions", &self.functions.len())
            .field("llm_providers", &self.llm_providers.len())
            .field("llm_clients", &self.llm_clients.len())
            .field("embedder_providers", &self.embedder_providers.len())
            .field("memory", &self.memory.len())
            .field("retriever_providers", &self.retriever_providers.len())
            .field("evaluators", &self.evaluators.len())
            .field("packages", &self.packages.len())
            .finish_non_exhaustive()
    }
}

impl TypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn registration_changed(&self) {
        if self.hooks_paused > 0 {
            return;
        }
        debug!("Registration changed. Notifying {} hooks.", self.hooks.len());
        for hook in &self.hooks {
            hook();
        }
    }

    /// Add a callback fired after every registration.
    pub fn add_registration_changed_hook(&mut self, hook: RegistrationHook) {
        self.hooks.push(hook);
    }

    /// Suppress change notifications while the returned guard lives.
    ///
    /// Exactly one notification fires when the outermost guard drops.
    pub fn pause_registration_changed_hooks(&mut self) -> PausedHooks<'_> {
        self.hooks_paused += 1;
        PausedHooks { registry: self }
    }

    fn registered<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_ok() {
            self.registration_changed();
        }
        result
    }

    // Front ends

    /// Register a front end.
    pub fn register_front_end(&mut self, info: RegisteredFrontEndInfo) -> Result<()> {
        let label = info.full_type.clone();
        let result = insert_unique(&mut self.front_ends, info.config_type, info, "front end", label);
        self.registered(result)
    }

    /// Front end registered for `config_type`.
    pub fn get_front_end(&self, config_type: ConfigType) -> Result<&RegisteredFrontEndInfo> {
        lookup(&self.front_ends, config_type, "front end")
    }

    /// Every front end registration.
    pub fn get_registered_front_ends(&self) -> Vec<&RegisteredFrontEndInfo> {
        self.front_ends.values().collect()
    }

    // Functions

    /// Register a function.
    pub fn register_function(&mut self, info: RegisteredFunctionInfo) -> Result<()> {
        let label = info.full_type.clone();
        let result = insert_unique(&mut self.functions, info.config_type, info, "function", label);
        self.registered(result)
    }

    /// Function registered for `config_type`.
    pub fn get_function(&self, config_type: ConfigType) -> Result<&RegisteredFunctionInfo> {
        lookup(&self.functions, config_type, "function")
    }

    /// Every function registration.
    pub fn get_registered_functions(&self) -> Vec<&RegisteredFunctionInfo> {
        self.functions.values().collect()
    }

    // Tool wrappers

    /// Register a tool wrapper.
    pub fn register_tool_wrapper(&mut self, info: RegisteredToolWrapper) -> Result<()> {
        let label = info.framework.to_string();
        let result = insert_unique(
            &mut self.tool_wrappers,
            info.framework.clone(),
            info,
            "tool wrapper",
            label,
        );
        self.registered(result)
    }

    /// Tool wrapper registered for `framework`.
    pub fn get_tool_wrapper(&self, framework: &Framework) -> Result<&RegisteredToolWrapper> {
        self.tool_wrappers.get(framework).ok_or_else(|| {
            PlexusError::not_found(format!(
                "Could not find a registered tool wrapper for framework `{framework}`. \
                 Registered frameworks: {}",
                key_list(self.tool_wrappers.keys())
            ))
        })
    }

    /// Every tool wrapper registration.
    pub fn get_registered_tool_wrappers(&self) -> Vec<&RegisteredToolWrapper> {
        self.tool_wrappers.values().collect()
    }

    // LLMs

    /// Register an LLM provider.
    pub fn register_llm_provider(&mut self, info: RegisteredLlmProviderInfo) -> Result<()> {
        let label = info.full_type.clone();
        let result = insert_unique(&mut self.llm_providers, info.config_type, info, "LLM provider", label);
        self.registered(result)
    }

    /// LLM provider registered for `config_type`.
    pub fn get_llm_provider(&self, config_type: ConfigType) -> Result<&RegisteredLlmProviderInfo> {
        lookup(&self.llm_providers, config_type, "LLM provider")
    }

    /// Every LLM provider registration.
    pub fn get_registered_llm_providers(&self) -> Vec<&RegisteredLlmProviderInfo> {
        self.llm_providers.values().collect()
    }

    /// Register an LLM client.
    pub fn register_llm_client(&mut self, info: RegisteredLlmClientInfo) -> Result<()> {
        let label = format!("{} ({})", info.full_type, info.framework);
        let key = (info.config_type, info.framework.clone());
        let result = insert_unique(&mut self.llm_clients, key, info, "LLM client", label);
        self.registered(result)
    }

    /// LLM client converting provider config `config_type` for `framework`.
    pub fn get_llm_client(
        &self,
        config_type: ConfigType,
        framework: &Framework,
    ) -> Result<&RegisteredLlmClientInfo> {
        self.llm_clients
            .get(&(config_type, framework.clone()))
            .ok_or_else(|| {
                incompatible_framework(
                    "LLM",
                    config_type,
                    Some(framework),
                    self.llm_clients.keys().map(|(c, f)| (*c, Some(f))),
                )
            })
    }

    /// Every LLM client registration.
    pub fn get_registered_llm_clients(&self) -> Vec<&RegisteredLlmClientInfo> {
        self.llm_clients.values().collect()
    }

    // Embedders

    /// Register an embedder provider.
    pub fn register_embedder_provider(&mut self, info: RegisteredEmbedderProviderInfo) -> Result<()> {
        let label = info.full_type.clone();
        let result = insert_unique(
            &mut self.embedder_providers,
            info.config_type,
            info,
            "embedder provider",
            label,
        );
        self.registered(result)
    }

    /// Embedder provider registered for `config_type`.
    pub fn get_embedder_provider(&self, config_type: ConfigType) -> Result<&RegisteredEmbedderProviderInfo> {
        lookup(&self.embedder_providers, config_type, "embedder provider")
    }

    /// Every embedder provider registration.
    pub fn get_registered_embedder_providers(&self) -> Vec<&RegisteredEmbedderProviderInfo> {
        self.embedder_providers.values().collect()
    }

    /// Register an embedder client.
    pub fn register_embedder_client(&mut self, info: RegisteredEmbedderClientInfo) -> Result<()> {
        let label = format!("{} ({})", info.full_type, info.framework);
        let key = (info.config_type, info.framework.clone());
        let result = insert_unique(&mut self.embedder_clients, key, info, "embedder client", label);
        self.registered(result)
    }

    /// Embedder client converting provider config `config_type` for `framework`.
    pub fn get_embedder_client(
        &self,
        config_type: ConfigType,
        framework: &Framework,
    ) -> Result<&RegisteredEmbedderClientInfo> {
        self.embedder_clients
            .get(&(config_type, framework.clone()))
            .ok_or_else(|| {
                incompatible_framework(
                    "Embedder",
                    config_type,
                    Some(framework),
                    self.embedder_clients.keys().map(|(c, f)| (*c, Some(f))),
                )
            })
    }

    /// Every embedder client registration.
    pub fn get_registered_embedder_clients(&self) -> Vec<&RegisteredEmbedderClientInfo> {
        self.embedder_clients.values().collect()
    }

    // Evaluators

    /// Register an evaluator.
    pub fn register_evaluator(&mut self, info: RegisteredEvaluatorInfo) -> Result<()> {
        let label = info.full_type.clone();
        let result = insert_unique(&mut self.evaluators, info.config_type, info, "evaluator", label);
        self.registered(result)
    }

    /// Evaluator registered for `config_type`.
    pub fn get_evaluator(&self, config_type: ConfigType) -> Result<&RegisteredEvaluatorInfo> {
        lookup(&self.evaluators, config_type, "evaluator")
    }

    /// Every evaluator registration.
    pub fn get_registered_evaluators(&self) -> Vec<&RegisteredEvaluatorInfo> {
        self.evaluators.values().collect()
    }

    // Memory

    /// Register a memory backend.
    pub fn register_memory(&mut self, info: RegisteredMemoryInfo) -> Result<()> {
        let label = info.full_type.clone();
        let result = insert_unique(&mut self.memory, info.config_type, info, "memory client", label);
        self.registered(result)
    }

    /// Memory backend registered for `config_type`.
    pub fn get_memory(&self, config_type: ConfigType) -> Result<&RegisteredMemoryInfo> {
        lookup(&self.memory, config_type, "memory client")
    }

    /// Every memory registration.
    pub fn get_registered_memory(&self) -> Vec<&RegisteredMemoryInfo> {
        self.memory.values().collect()
    }

    // Retrievers

    /// Register a retriever provider.
    pub fn register_retriever_provider(&mut self, info: RegisteredRetrieverProviderInfo) -> Result<()> {
        let label = info.full_type.clone();
        let result = insert_unique(
            &mut self.retriever_providers,
            info.config_type,
            info,
            "retriever provider",
            label,
        );
        self.registered(result)
    }

    /// Retriever provider registered for `config_type`.
    pub fn get_retriever_provider(&self, config_type: ConfigType) -> Result<&RegisteredRetrieverProviderInfo> {
        lookup(&self.retriever_providers, config_type, "retriever provider")
    }

    /// Every retriever provider registration.
    pub fn get_registered_retriever_providers(&self) -> Vec<&RegisteredRetrieverProviderInfo> {
        self.retriever_providers.values().collect()
    }

    /// Register a retriever client.
    pub fn register_retriever_client(&mut self, info: RegisteredRetrieverClientInfo) -> Result<()> {
        let label = match &info.framework {
            Some(framework) => format!("{} ({framework})", info.full_type),
            None => info.full_type.clone(),
        };
        let key = (info.config_type, info.framework.clone());
        let result = insert_unique(&mut self.retriever_clients, key, info, "retriever client", label);
        self.registered(result)
    }

    /// Retriever client converting provider config `config_type` for
    /// `framework`, falling back to the framework-agnostic client.
    pub fn get_retriever_client(
        &self,
        config_type: ConfigType,
        framework: Option<&Framework>,
    ) -> Result<&RegisteredRetrieverClientInfo> {
        self.retriever_clients
            .get(&(config_type, framework.cloned()))
            .or_else(|| self.retriever_clients.get(&(config_type, None)))
            .ok_or_else(|| {
                incompatible_framework(
                    "Retriever",
                    config_type,
                    framework,
                    self.retriever_clients.keys().map(|(c, f)| (*c, f.as_ref())),
                )
            })
    }

    /// Every retriever client registration.
    pub fn get_registered_retriever_clients(&self) -> Vec<&RegisteredRetrieverClientInfo> {
        self.retriever_clients.values().collect()
    }

    // Registry handlers

    /// Register a registry handler.
    pub fn register_registry_handler(&mut self, info: RegisteredRegistryHandlerInfo) -> Result<()> {
        let label = info.full_type.clone();
        let result = insert_unique(
            &mut self.registry_handlers,
            info.config_type,
            info,
            "registry handler",
            label,
        );
        self.registered(result)
    }

    /// Registry handler registered for `config_type`.
    pub fn get_registry_handler(&self, config_type: ConfigType) -> Result<&RegisteredRegistryHandlerInfo> {
        lookup(&self.registry_handlers, config_type, "registry handler")
    }

    /// Every registry handler registration.
    pub fn get_registered_registry_handlers(&self) -> Vec<&RegisteredRegistryHandlerInfo> {
        self.registry_handlers.values().collect()
    }

    // Telemetry

    /// Register a logging method.
    pub fn register_logging_method(&mut self, info: RegisteredLoggingMethod) -> Result<()> {
        let label = info.full_type.clone();
        let result = insert_unique(&mut self.logging_methods, info.config_type, info, "logging method", label);
        self.registered(result)
    }

    /// Logging method registered for `config_type`.
    pub fn get_logging_method(&self, config_type: ConfigType) -> Result<&RegisteredLoggingMethod> {
        lookup(&self.logging_methods, config_type, "logging method")
    }

    /// Every logging method registration.
    pub fn get_registered_logging_methods(&self) -> Vec<&RegisteredLoggingMethod> {
        self.logging_methods.values().collect()
    }

    /// Register a telemetry exporter.
    pub fn register_telemetry_exporter(&mut self, info: RegisteredTelemetryExporter) -> Result<()> {
        let label = info.full_type.clone();
        let result = insert_unique(
            &mut self.telemetry_exporters,
            info.config_type,
            info,
            "telemetry exporter",
            label,
        );
        self.registered(result)
    }

    /// Telemetry exporter registered for `config_type`.
    pub fn get_telemetry_exporter(&self, config_type: ConfigType) -> Result<&RegisteredTelemetryExporter> {
        lookup(&self.telemetry_exporters, config_type, "telemetry exporter")
    }

    /// Every telemetry exporter registration.
    pub fn get_registered_telemetry_exporters(&self) -> Vec<&RegisteredTelemetryExporter> {
        self.telemetry_exporters.values().collect()
    }

    // Packages

    /// Record an installed plugin package. Re-registering a package
    /// replaces its metadata.
    pub fn register_package(&mut self, package_name: &str, package_version: Option<&str>) {
        let discovery_metadata =
            DiscoveryMetadata::for_package(package_name, package_version.unwrap_or_default());
        info!("Registered package {}", package_name);
        self.packages.insert(
            package_name.to_string(),
            RegisteredPackage {
                package_name: package_name.to_string(),
                discovery_metadata,
            },
        );
        self.registration_changed();
    }

    /// Every registered package.
    pub fn get_registered_packages(&self) -> Vec<&RegisteredPackage> {
        self.packages.values().collect()
    }

    /// Move every registration of `other` into this registry.
    ///
    /// Nothing is moved when `other` registers a key this registry already
    /// holds. Packages of `other` replace same-named packages. Hooks of
    /// `other` are discarded.
    pub fn merge(&mut self, other: TypeRegistry) -> Result<()> {
        let by_type = |config_type: &ConfigType| config_type.full_type();
        disjoint(&self.front_ends, &other.front_ends, "front end", by_type)?;
        disjoint(&self.functions, &other.functions, "function", by_type)?;
        disjoint(&self.tool_wrappers, &other.tool_wrappers, "tool wrapper", ToString::to_string)?;
        disjoint(&self.llm_providers, &other.llm_providers, "LLM provider", by_type)?;
        disjoint(&self.llm_clients, &other.llm_clients, "LLM client", |(c, f)| {
            format!("{} ({f})", c.full_type())
        })?;
        disjoint(&self.embedder_providers, &other.embedder_providers, "embedder provider", by_type)?;
        disjoint(&self.embedder_clients, &other.embedder_clients, "embedder client", |(c, f)| {
            format!("{} ({f})", c.full_type())
        })?;
        disjoint(&self.evaluators, &other.evaluators, "evaluator", by_type)?;
        disjoint(&self.memory, &other.memory, "memory", by_type)?;
        disjoint(&self.retriever_providers, &other.retriever_providers, "retriever provider", by_type)?;
        disjoint(&self.retriever_clients, &other.retriever_clients, "retriever client", |(c, f)| {
            match f {
                Some(f) => format!("{} ({f})", c.full_type()),
                None => c.full_type(),
            }
        })?;
        disjoint(&self.registry_handlers, &other.registry_handlers, "registry handler", by_type)?;
        disjoint(&self.logging_methods, &other.logging_methods, "logging method", by_type)?;
        disjoint(&self.telemetry_exporters, &other.telemetry_exporters, "telemetry exporter", by_type)?;

        let TypeRegistry {
            front_ends,
            functions,
            tool_wrappers,
            llm_providers,
            llm_clients,
            embedder_providers,
            embedder_clients,
            evaluators,
            memory,
            retriever_providers,
            retriever_clients,
            registry_handlers,
            logging_methods,
            telemetry_exporters,
            packages,
            hooks: _,
            hooks_paused: _,
        } = other;
        self.front_ends.extend(front_ends);
        self.functions.extend(functions);
        self.tool_wrappers.extend(tool_wrappers);
        self.llm_providers.extend(llm_providers);
        self.llm_clients.extend(llm_clients);
        self.embedder_providers.extend(embedder_providers);
        self.embedder_clients.extend(embedder_clients);
        self.evaluators.extend(evaluators);
        self.memory.extend(memory);
        self.retriever_providers.extend(retriever_providers);
        self.retriever_clients.extend(retriever_clients);
        self.registry_handlers.extend(registry_handlers);
        self.logging_methods.extend(logging_methods);
        self.telemetry_exporters.extend(telemetry_exporters);
        self.packages.extend(packages);
        self.registration_changed();
        Ok(())
    }

    // Discovery

    /// Discovery metadata of every registration of `kind`.
    pub fn get_discovery_metadata(&self, kind: ComponentKind) -> Vec<DiscoveryMetadata> {
        fn collect<'a, V: 'a>(
            values: impl Iterator<Item = &'a V>,
            metadata: impl Fn(&V) -> &DiscoveryMetadata,
        ) -> Vec<DiscoveryMetadata> {
            values.map(|value| metadata(value).clone()).collect()
        }

        match kind {
            ComponentKind::FrontEnd => collect(self.front_ends.values(), |r| &r.discovery_metadata),
            ComponentKind::Function => collect(self.functions.values(), |r| &r.discovery_metadata),
            ComponentKind::ToolWrapper => collect(self.tool_wrappers.values(), |r| &r.discovery_metadata),
            ComponentKind::LlmProvider => collect(self.llm_providers.values(), |r| &r.discovery_metadata),
            ComponentKind::LlmClient => collect(self.llm_clients.values(), |r| &r.discovery_metadata),
            ComponentKind::EmbedderProvider => {
                collect(self.embedder_providers.values(), |r| &r.discovery_metadata)
            }
            ComponentKind::EmbedderClient => collect(self.embedder_clients.values(), |r| &r.discovery_metadata),
            ComponentKind::Evaluator => collect(self.evaluators.values(), |r| &r.discovery_metadata),
            ComponentKind::Memory => collect(self.memory.values(), |r| &r.discovery_metadata),
            ComponentKind::RetrieverProvider => {
                collect(self.retriever_providers.values(), |r| &r.discovery_metadata)
            }
            ComponentKind::RetrieverClient => collect(self.retriever_clients.values(), |r| &r.discovery_metadata),
            ComponentKind::RegistryHandler => collect(self.registry_handlers.values(), |r| &r.discovery_metadata),
            ComponentKind::Logging => collect(self.logging_methods.values(), |r| &r.discovery_metadata),
            ComponentKind::Tracing => collect(self.telemetry_exporters.values(), |r| &r.discovery_metadata),
            ComponentKind::Package => collect(self.packages.values(), |r| &r.discovery_metadata),
            ComponentKind::Undefined => Vec::new(),
        }
    }

    /// Names of every registration of `kind`, as shown by listing tools.
    pub fn get_registered_types(&self, kind: ComponentKind) -> Vec<String> {
        match kind {
            ComponentKind::ToolWrapper => self.tool_wrappers.keys().map(ToString::to_string).collect(),
            ComponentKind::Package => self.packages.keys().cloned().collect(),
            ComponentKind::LlmClient | ComponentKind::EmbedderClient | ComponentKind::RetrieverClient => self
                .get_discovery_metadata(kind)
                .into_iter()
                .map(|metadata| metadata.component_name)
                .collect(),
            _ => self.config_types(kind).iter().map(ConfigType::full_type).collect(),
        }
    }

    fn config_types(&self, kind: ComponentKind) -> Vec<ConfigType> {
        match kind {
            ComponentKind::FrontEnd => self.front_ends.keys().copied().collect(),
            ComponentKind::Function => self.functions.keys().copied().collect(),
            ComponentKind::LlmProvider => self.llm_providers.keys().copied().collect(),
            ComponentKind::EmbedderProvider => self.embedder_providers.keys().copied().collect(),
            ComponentKind::Evaluator => self.evaluators.keys().copied().collect(),
            ComponentKind::Memory => self.memory.keys().copied().collect(),
            ComponentKind::RetrieverProvider => self.retriever_providers.keys().copied().collect(),
            ComponentKind::RegistryHandler => self.registry_handlers.keys().copied().collect(),
            ComponentKind::Logging => self.logging_methods.keys().copied().collect(),
            ComponentKind::Tracing => self.telemetry_exporters.keys().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Compute the tags a declarative configuration entry of `kind` may use.
    pub fn compute_annotation(&self, kind: ComponentKind) -> Result<ConfigAnnotation> {
        let annotation = match kind {
            ComponentKind::FrontEnd => ConfigAnnotation::from_records(kind, self.front_ends.values()),
            ComponentKind::Function => {
                ConfigAnnotation::from_records(kind, self.functions.values().map(|r| &r.info))
            }
            ComponentKind::LlmProvider => ConfigAnnotation::from_records(kind, self.llm_providers.values()),
            ComponentKind::EmbedderProvider => {
                ConfigAnnotation::from_records(kind, self.embedder_providers.values())
            }
            ComponentKind::Evaluator => ConfigAnnotation::from_records(kind, self.evaluators.values()),
            ComponentKind::Memory => ConfigAnnotation::from_records(kind, self.memory.values()),
            ComponentKind::RetrieverProvider => {
                ConfigAnnotation::from_records(kind, self.retriever_providers.values())
            }
            ComponentKind::RegistryHandler => {
                ConfigAnnotation::from_records(kind, self.registry_handlers.values())
            }
            ComponentKind::Logging => ConfigAnnotation::from_records(kind, self.logging_methods.values()),
            ComponentKind::Tracing => ConfigAnnotation::from_records(kind, self.telemetry_exporters.values()),
            _ => {
                return Err(PlexusError::configuration(format!(
                    "Component kind `{kind}` has no configuration annotation"
                )));
            }
        };
        Ok(annotation)
    }
}

fn incompatible_framework<'a>(
    group: &str,
    config_type: ConfigType,
    framework: Option<&Framework>,
    registered: impl Iterator<Item = (ConfigType, Option<&'a Framework>)>,
) -> PlexusError {
    let framework = framework.map_or_else(|| "none".to_string(), ToString::to_string);
    let providers: IndexSet<String> = registered
        .filter(|(_, f)| f.map_or_else(|| "none".to_string(), ToString::to_string) == framework)
        .map(|(c, _)| c.full_type())
        .collect();
    PlexusError::incompatible_framework(format!(
        "An invalid {group} config and framework combination was supplied. Config: `{config_type}`, \
         Framework: `{framework}`. The workflow is requesting a {framework} {group} client but there \
         is no registered conversion from that {group} provider to {framework}. Please provide a \
         {group} configuration from one of the following providers: [{}]",
        providers.into_iter().collect::<Vec<_>>().join(", ")
    ))
}

/// Registry access while change notifications are paused.
pub struct PausedHooks<'a> {
    registry: &'a mut TypeRegistry,
}

impl Deref for PausedHooks<'_> {
    type Target = TypeRegistry;

    fn deref(&self) -> &TypeRegistry {
        self.registry
    }
}

impl DerefMut for PausedHooks<'_> {
    fn deref_mut(&mut self) -> &mut TypeRegistry {
        self.registry
    }
}

impl Drop for PausedHooks<'_> {
    fn drop(&mut self) {
        self.registry.hooks_paused = self.registry.hooks_paused.saturating_sub(1);
        self.registry.registration_changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::TypedConfig,
        function::FunctionArtifact,
        traits::{Built, ProviderInfo},
    };
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct EchoConfig {
        #[serde(default)]
        prefix: String,
    }

    impl TypedConfig for EchoConfig {
        const TYPE_NAME: &'static str = "echo";
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct TestLlmConfig {}

    impl TypedConfig for TestLlmConfig {
        const TYPE_NAME: &'static str = "test_llm";
    }

    mod other {
        use super::*;

        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        pub struct EchoConfig {}

        impl TypedConfig for EchoConfig {
            const TYPE_NAME: &'static str = "echo";
        }
    }

    fn echo_function() -> RegisteredFunctionInfo {
        RegisteredFunctionInfo::new(|_config: Arc<EchoConfig>, _builder| async move {
            Ok::<_, PlexusError>(Built::new(FunctionArtifact::callable(|x: String| async move {
                Ok::<_, PlexusError>(x)
            })))
        })
    }

    fn test_llm() -> RegisteredLlmProviderInfo {
        RegisteredInfo::llm_provider(|config: Arc<TestLlmConfig>, _builder| async move {
            Ok::<_, PlexusError>(Built::new(ProviderInfo::new(config)))
        })
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = TypeRegistry::new();
        registry.register_function(echo_function()).unwrap();
        let err = registry.register_function(echo_function()).unwrap_err();
        assert!(matches!(err, PlexusError::DuplicateRegistration { .. }));

        registry.register_llm_provider(test_llm()).unwrap();
        assert!(registry.register_llm_provider(test_llm()).is_err());
    }

    #[test]
    fn test_incompatible_framework_lists_each_provider_once() {
        let langchain = Framework::from("langchain");
        let llama = Framework::from("llama_index");
        let registered = [
            (ConfigType::of::<TestLlmConfig>(), Some(&langchain)),
            (ConfigType::of::<EchoConfig>(), Some(&langchain)),
            (ConfigType::of::<TestLlmConfig>(), Some(&llama)),
            (ConfigType::of::<TestLlmConfig>(), Some(&langchain)),
        ];

        let err = incompatible_framework(
            "llm",
            ConfigType::of::<other::EchoConfig>(),
            Some(&langchain),
            registered.into_iter(),
        );
        let message = err.to_string();
        let test_llm = ConfigType::of::<TestLlmConfig>().full_type();
        let echo = ConfigType::of::<EchoConfig>().full_type();
        assert_eq!(message.matches(test_llm.as_str()).count(), 1);
        assert!(message.contains(&format!("[{test_llm}, {echo}]")));
    }

    #[test]
    fn test_lookup_returns_registration() {
        let mut registry = TypeRegistry::new();
        registry.register_function(echo_function()).unwrap();

        let found = registry.get_function(ConfigType::of::<EchoConfig>()).unwrap();
        assert_eq!(found.local_name(), "echo");
        assert_eq!(found.discovery_metadata.component_type, ComponentKind::Function);

        let err = registry.get_function(ConfigType::of::<TestLlmConfig>()).unwrap_err();
        assert!(err.to_string().contains("test_llm"));
        assert!(err.to_string().contains("echo"));
    }

    #[test]
    fn test_client_keys_include_framework() {
        let mut registry = TypeRegistry::new();
        registry.register_llm_provider(test_llm()).unwrap();
        let client = || {
            RegisteredClientInfo::llm_client("test_framework", |config: Arc<TestLlmConfig>, _builder| async move {
                Ok::<_, PlexusError>(Built::new(config))
            })
        };
        registry.register_llm_client(client()).unwrap();
        assert!(registry.register_llm_client(client()).is_err());

        let config_type = ConfigType::of::<TestLlmConfig>();
        assert!(registry.get_llm_client(config_type, &Framework::new("test_framework")).is_ok());

        let err = registry
            .get_llm_client(config_type, &Framework::new("unknown_framework"))
            .unwrap_err();
        assert!(matches!(err, PlexusError::IncompatibleFramework { .. }));
        assert!(err.to_string().contains("unknown_framework"));
        assert!(err.to_string().contains("test_llm"));
    }

    #[test]
    fn test_retriever_client_falls_back_to_agnostic() {
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        struct IndexConfig {}
        impl TypedConfig for IndexConfig {
            const TYPE_NAME: &'static str = "index";
        }

        let mut registry = TypeRegistry::new();
        registry
            .register_retriever_client(RegisteredClientInfo::retriever_client(
                None,
                |_config: Arc<IndexConfig>, _builder| async move {
                    Ok::<_, PlexusError>(Built::new("agnostic"))
                },
            ))
            .unwrap();

        let config_type = ConfigType::of::<IndexConfig>();
        assert!(registry.get_retriever_client(config_type, None).is_ok());
        let found = registry
            .get_retriever_client(config_type, Some(&Framework::new(Framework::LANGCHAIN)))
            .unwrap();
        assert_eq!(found.framework, None);
    }

    #[test]
    fn test_annotation_short_names_only_when_unique() {
        let mut registry = TypeRegistry::new();
        registry.register_function(echo_function()).unwrap();
        let annotation = registry.compute_annotation(ComponentKind::Function).unwrap();
        assert!(annotation.tags().any(|tag| tag == "echo"));

        registry
            .register_function(RegisteredFunctionInfo::new(
                |_config: Arc<other::EchoConfig>, _builder| async move {
                    Ok::<_, PlexusError>(Built::new(FunctionArtifact::callable(|x: u32| async move {
                        Ok::<_, PlexusError>(x)
                    })))
                },
            ))
            .unwrap();
        let annotation = registry.compute_annotation(ComponentKind::Function).unwrap();
        let tags: Vec<&str> = annotation.tags().collect();
        assert_eq!(tags.len(), 2);
        assert!(!tags.contains(&"echo"));
        assert!(annotation.resolve("plexus_core::registry::tests::other/echo").is_ok());
        assert!(matches!(
            annotation.resolve("echo"),
            Err(PlexusError::UnregisteredConfig { .. })
        ));
    }

    #[test]
    fn test_annotation_parses_tagged_values() {
        let mut registry = TypeRegistry::new();
        registry.register_function(echo_function()).unwrap();
        let annotation = registry.compute_annotation(ComponentKind::Function).unwrap();

        let handle = annotation.parse(json!({"_type": "echo", "prefix": ">"})).unwrap();
        assert_eq!(handle.config_type(), ConfigType::of::<EchoConfig>());
        assert!(annotation.parse(json!({"prefix": ">"})).is_err());
        assert!(annotation.parse(json!({"_type": "nope"})).is_err());
        assert!(registry.compute_annotation(ComponentKind::LlmClient).is_err());
    }

    #[test]
    fn test_paused_hooks_fire_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut registry = TypeRegistry::new();
        let counter = Arc::clone(&fired);
        registry.add_registration_changed_hook(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.register_function(echo_function()).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        {
            let mut paused = registry.pause_registration_changed_hooks();
            paused.register_llm_provider(test_llm()).unwrap();
            paused.register_package("plexus-test", Some("0.1.0"));
            assert_eq!(fired.load(Ordering::SeqCst), 1);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(registry.get_registered_types(ComponentKind::Package), vec!["plexus-test"]);
    }

    #[test]
    fn test_merge_moves_registrations_and_notifies_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut registry = TypeRegistry::new();
        let counter = Arc::clone(&fired);
        registry.add_registration_changed_hook(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        registry.register_function(echo_function()).unwrap();

        let mut other = TypeRegistry::new();
        other.register_llm_provider(test_llm()).unwrap();
        other.register_package("plexus-test", Some("0.1.0"));
        registry.merge(other).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert!(registry.get_function(ConfigType::of::<EchoConfig>()).is_ok());
        assert!(registry.get_llm_provider(ConfigType::of::<TestLlmConfig>()).is_ok());
        assert_eq!(registry.get_registered_types(ComponentKind::Package), vec!["plexus-test"]);
    }

    #[test]
    fn test_conflicting_merge_moves_nothing() {
        let mut registry = TypeRegistry::new();
        registry.register_function(echo_function()).unwrap();

        let mut other = TypeRegistry::new();
        other.register_llm_provider(test_llm()).unwrap();
        other.register_function(echo_function()).unwrap();
        other.register_package("plexus-test", None);
        let err = registry.merge(other).unwrap_err();

        assert!(matches!(err, PlexusError::DuplicateRegistration { .. }));
        assert!(err.to_string().contains("echo"));
        assert!(registry.get_registered_llm_providers().is_empty());
        assert!(registry.get_registered_packages().is_empty());
        assert_eq!(registry.get_registered_functions().len(), 1);
    }
}
