//! The workflow builder.
//!
//! [`WorkflowBuilder`] turns a [`WorkflowConfig`] into a wired [`Workflow`].
//! It is a scoped resource: [`enter`](WorkflowBuilder::enter) establishes
//! logging and tracing, [`populate_builder`](WorkflowBuilder::populate_builder)
//! instantiates every named component in dependency order, and
//! [`exit`](WorkflowBuilder::exit) releases everything that was acquired, in
//! reverse order. [`WorkflowBuilder::from_config`] runs the whole sequence
//! around a closure and always exits.
//!
//! ```rust,no_run
//! use plexus_core::{GlobalTypeRegistry, WorkflowConfig};
//! use plexus_runtime::WorkflowBuilder;
//!
//! # async fn example(config: WorkflowConfig) -> plexus_core::Result<()> {
//! let output: String = WorkflowBuilder::from_config(&config, GlobalTypeRegistry::get(), |builder| async move {
//!     let workflow = builder.build()?;
//!     workflow.result_as("Hello").await
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod child;
pub mod order;

use async_trait::async_trait;
use indexmap::IndexMap;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, error, info, warn};

use plexus_core::{
    Builder, ConfigHandle, EvalBuilder, Function, PlexusError, Result, TypeRegistry,
    WorkflowConfig,
    config::{ComponentMap, EvalConfig, EvalGeneralConfig, GeneralConfig},
    traits::{ClientHandle, EvaluatorInfo, MemoryEditor, ProviderInfo, SpanExporter, Teardown, ToolHandle},
    types::{ComponentGroup, Framework, FunctionDependencies},
};

use crate::{
    logging::install_logging_layers,
    workflow::{WORKFLOW_FUNCTION_NAME, Workflow, WorkflowComponents},
};

use child::ChildBuilder;
pub use order::{BuildStep, build_order};

/// Lifecycle of a [`WorkflowBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuilderState {
    /// Created, not entered yet
    #[default]
    Uninitialized,
    /// Logging and tracing established, components may be added
    Entered,
    /// A workflow was built
    Built,
    /// Every acquired resource was released
    Exited,
}

/// A built component together with the configuration it was built from.
#[derive(Clone)]
pub struct Configured<T> {
    /// Configuration the component was built from
    pub config: ConfigHandle,
    /// The built component
    pub instance: T,
}

#[derive(Default)]
struct BuilderStore {
    lifecycle: BuilderState,
    general: GeneralConfig,
    eval_general: EvalGeneralConfig,
    functions: IndexMap<String, Configured<Arc<dyn Function>>>,
    workflow: Option<Configured<Arc<dyn Function>>>,
    llms: IndexMap<String, Configured<ProviderInfo>>,
    embedders: IndexMap<String, Configured<ProviderInfo>>,
    memory: IndexMap<String, Configured<Arc<dyn MemoryEditor>>>,
    retrievers: IndexMap<String, Configured<ProviderInfo>>,
    evaluators: IndexMap<String, Configured<EvaluatorInfo>>,
    exporters: IndexMap<String, Configured<Arc<dyn SpanExporter>>>,
    dependencies: HashMap<String, FunctionDependencies>,
    teardowns: Vec<(String, Teardown)>,
}

impl BuilderStore {
    fn contains(&self, group: ComponentGroup, name: &str) -> bool {
        match group {
            ComponentGroup::Functions => self.functions.contains_key(name),
            ComponentGroup::Llms => self.llms.contains_key(name),
            ComponentGroup::Embedders => self.embedders.contains_key(name),
            ComponentGroup::Memory => self.memory.contains_key(name),
            ComponentGroup::Retrievers => self.retrievers.contains_key(name),
        }
    }

    fn providers_mut(&mut self, group: ComponentGroup) -> Result<&mut IndexMap<String, Configured<ProviderInfo>>> {
        match group {
            ComponentGroup::Llms => Ok(&mut self.llms),
            ComponentGroup::Embedders => Ok(&mut self.embedders),
            ComponentGroup::Retrievers => Ok(&mut self.retrievers),
            other => Err(PlexusError::internal(format!("`{other}` is not a provider group"))),
        }
    }
}

fn configs<T>(map: &IndexMap<String, Configured<T>>) -> ComponentMap {
    map.iter()
        .map(|(name, configured)| (name.clone(), configured.config.clone()))
        .collect()
}

fn instances<T: Clone>(map: &IndexMap<String, Configured<T>>) -> IndexMap<String, T> {
    map.iter()
        .map(|(name, configured)| (name.clone(), configured.instance.clone()))
        .collect()
}

fn insert_named<T>(
    map: &mut IndexMap<String, Configured<T>>,
    group: &str,
    name: &str,
    configured: Configured<T>,
) -> Result<()> {
    if map.contains_key(name) {
        return Err(PlexusError::duplicate_name(group, name));
    }
    map.insert(name.to_string(), configured);
    Ok(())
}

fn unregistered(config: &ConfigHandle, error: &PlexusError) -> PlexusError {
    PlexusError::unregistered_config(config.config_type().full_type(), error.to_string())
}

fn build_failed(kind: &str, name: &str, config: &ConfigHandle, error: PlexusError) -> PlexusError {
    error!("Error building {} `{}` with config `{:?}`: {}", kind, name, config, error);
    error
}

fn client_lookup_failed(kind: &str, name: &str, framework: &str, error: PlexusError) -> PlexusError {
    error!("Error building {} `{}` for framework `{}`: {}", kind, name, framework, error);
    error
}

fn not_found(kind: &str, name: &str) -> PlexusError {
    PlexusError::not_found(format!("{kind} `{name}` not found"))
}

struct BuilderInner {
    registry: Arc<TypeRegistry>,
    store: Mutex<BuilderStore>,
}

/// Builds a [`Workflow`] from named component configurations.
///
/// The builder is a cheap handle; clones share the same state. It is handed
/// to every component build as the [`Builder`] the build may request other
/// components from.
#[derive(Clone)]
pub struct WorkflowBuilder {
    inner: Arc<BuilderInner>,
}

impl fmt::Debug for WorkflowBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store();
        f.debug_struct("WorkflowBuilder")
            .field("state", &store.lifecycle)
            .field("functions", &store.functions.keys().collect::<Vec<_>>())
            .field("llms", &store.llms.keys().collect::<Vec<_>>())
            .field("has_workflow", &store.workflow.is_some())
            .finish_non_exhaustive()
    }
}

impl WorkflowBuilder {
    /// Create a builder resolving components through `registry`.
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            inner: Arc::new(BuilderInner {
                registry,
                store: Mutex::new(BuilderStore::default()),
            }),
        }
    }

    /// Telemetry and front end settings established on [`enter`](Self::enter).
    #[must_use]
    pub fn with_general_config(self, general: GeneralConfig) -> Self {
        self.store().general = general;
        self
    }

    /// Evaluation settings reported through [`EvalBuilder`].
    #[must_use]
    pub fn with_eval_general_config(self, eval_general: EvalGeneralConfig) -> Self {
        self.store().eval_general = eval_general;
        self
    }

    fn store(&self) -> MutexGuard<'_, BuilderStore> {
        self.inner.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self) -> Arc<dyn Builder> {
        Arc::new(self.clone())
    }

    fn push_teardown(&self, label: String, teardown: Option<Teardown>) {
        if let Some(teardown) = teardown {
            self.store().teardowns.push((label, teardown));
        }
    }

    fn ensure_free(&self, group: ComponentGroup, name: &str) -> Result<()> {
        if self.store().contains(group, name) {
            return Err(PlexusError::duplicate_name(group.singular(), name));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.store().lifecycle {
            BuilderState::Entered | BuilderState::Built => Ok(()),
            BuilderState::Uninitialized => Err(PlexusError::invalid_state(
                "Cannot add components before entering the builder",
            )),
            BuilderState::Exited => Err(PlexusError::invalid_state(
                "Cannot add components after the builder was exited",
            )),
        }
    }

    /// Registry the builder resolves components through.
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.inner.registry
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BuilderState {
        self.store().lifecycle
    }

    /// Establish logging and tracing from the general configuration.
    pub async fn enter(&self) -> Result<()> {
        let general = {
            let mut store = self.store();
            if store.lifecycle != BuilderState::Uninitialized {
                return Err(PlexusError::invalid_state(
                    "Cannot enter the builder more than once",
                ));
            }
            store.lifecycle = BuilderState::Entered;
            store.general.clone()
        };

        let mut layers = Vec::with_capacity(general.telemetry.logging.len());
        for (name, config) in &general.telemetry.logging {
            let build_fn = self
                .inner
                .registry
                .get_logging_method(config.config_type())
                .map_err(|e| unregistered(config, &e))?
                .build_fn
                .clone();
            let built = build_fn(config.clone(), self.handle())
                .await
                .map_err(|e| build_failed("logging method", name, config, e))?;
            let (layer, teardown) = built.into_parts();
            self.push_teardown(format!("logging method `{name}`"), teardown);
            layers.push(layer);
        }
        install_logging_layers(layers);

        for (name, config) in &general.telemetry.tracing {
            self.add_telemetry_exporter(name, config.clone()).await?;
        }
        Ok(())
    }

    /// Build a span exporter and keep it for the workflow's runs.
    pub async fn add_telemetry_exporter(&self, name: &str, config: ConfigHandle) -> Result<()> {
        self.ensure_open()?;
        if self.store().exporters.contains_key(name) {
            return Err(PlexusError::duplicate_name("Telemetry exporter", name));
        }
        let build_fn = self
            .inner
            .registry
            .get_telemetry_exporter(config.config_type())
            .map_err(|e| unregistered(&config, &e))?
            .build_fn
            .clone();
        let built = build_fn(config.clone(), self.handle())
            .await
            .map_err(|e| build_failed("telemetry exporter", name, &config, e))?;
        let (instance, teardown) = built.into_parts();
        self.push_teardown(format!("telemetry exporter `{name}`"), teardown);
        insert_named(
            &mut self.store().exporters,
            "Telemetry exporter",
            name,
            Configured { config, instance },
        )
    }

    /// Instantiate every component of `config` in dependency order, then the
    /// workflow entry and the evaluators.
    pub async fn populate_builder(&self, config: &WorkflowConfig) -> Result<()> {
        if self.state() != BuilderState::Entered {
            return Err(PlexusError::invalid_state(
                "The builder must be entered before it is populated",
            ));
        }
        {
            let mut store = self.store();
            store.general = config.general.clone();
            store.eval_general = config.eval.general.clone();
        }

        for step in build_order(config)? {
            let BuildStep { component, config } = step;
            debug!("Building {}", component);
            match component.group {
                ComponentGroup::Llms => self.add_llm(&component.name, config).await?,
                ComponentGroup::Embedders => self.add_embedder(&component.name, config).await?,
                ComponentGroup::Memory => self.add_memory_client(&component.name, config).await?,
                ComponentGroup::Retrievers => self.add_retriever(&component.name, config).await?,
                ComponentGroup::Functions => {
                    self.add_function(&component.name, config).await?;
                }
            }
        }

        if let Some(workflow) = &config.workflow {
            self.set_workflow(workflow.clone()).await?;
        }

        for (name, evaluator) in &config.eval.evaluators {
            self.add_evaluator(name, evaluator.clone()).await?;
        }
        Ok(())
    }

    /// Assemble the workflow from the components built so far.
    ///
    /// The workflow's configuration echoes exactly the configurations that
    /// were used.
    pub fn build(&self) -> Result<Workflow> {
        self.assemble(None)
    }

    /// Assemble a workflow whose entry point is the named function instead
    /// of the designated workflow.
    pub fn build_with_entry(&self, entry_function: &str) -> Result<Workflow> {
        self.assemble(Some(entry_function))
    }

    fn assemble(&self, entry_function: Option<&str>) -> Result<Workflow> {
        let mut store = self.store();
        if !matches!(store.lifecycle, BuilderState::Entered | BuilderState::Built) {
            return Err(PlexusError::invalid_state(
                "Cannot build the workflow outside the builder scope",
            ));
        }
        let entry = match entry_function {
            Some(name) => store
                .functions
                .get(name)
                .cloned()
                .ok_or_else(|| PlexusError::not_found(format!("function `{name}`")))?,
            None => store.workflow.clone().ok_or(PlexusError::NoWorkflowSet)?,
        };

        let config = WorkflowConfig {
            general: store.general.clone(),
            functions: configs(&store.functions),
            llms: configs(&store.llms),
            embedders: configs(&store.embedders),
            memory: configs(&store.memory),
            retrievers: configs(&store.retrievers),
            workflow: Some(entry.config.clone()),
            eval: EvalConfig {
                general: store.eval_general.clone(),
                evaluators: configs(&store.evaluators),
            },
        };
        let components = WorkflowComponents {
            functions: instances(&store.functions),
            llms: instances(&store.llms),
            embedders: instances(&store.embedders),
            memory: instances(&store.memory),
            retrievers: instances(&store.retrievers),
            exporters: instances(&store.exporters),
        };
        store.lifecycle = BuilderState::Built;
        drop(store);

        info!("Built workflow `{}`", entry.config.config_type());
        Ok(Workflow::new(config, entry.instance, components))
    }

    /// Release every acquired resource in reverse acquisition order.
    ///
    /// Every teardown runs even if an earlier one fails; the first failure is
    /// returned.
    pub async fn exit(&self) -> Result<()> {
        let (teardowns, exporters) = {
            let mut store = self.store();
            match store.lifecycle {
                BuilderState::Uninitialized => {
                    return Err(PlexusError::invalid_state(
                        "Cannot exit the builder without entering it",
                    ));
                }
                BuilderState::Exited => {
                    return Err(PlexusError::invalid_state("The builder was already exited"));
                }
                BuilderState::Entered | BuilderState::Built => {}
            }
            store.lifecycle = BuilderState::Exited;
            let exporters: Vec<Arc<dyn SpanExporter>> = store
                .exporters
                .values()
                .map(|exporter| Arc::clone(&exporter.instance))
                .collect();
            (std::mem::take(&mut store.teardowns), exporters)
        };

        for exporter in exporters {
            exporter.force_flush();
            exporter.shutdown();
        }

        let mut first_error = None;
        for (label, teardown) in teardowns.into_iter().rev() {
            debug!("Releasing {}", label);
            if let Err(e) = teardown().await {
                error!("Error releasing {}: {}", label, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Enter, populate from `config`, run `f`, and exit.
    ///
    /// The builder is exited on every path; when both `f` and the exit fail,
    /// the error of `f` is returned and the exit error is logged.
    pub async fn from_config<F, Fut, R>(
        config: &WorkflowConfig,
        registry: Arc<TypeRegistry>,
        f: F,
    ) -> Result<R>
    where
        F: FnOnce(WorkflowBuilder) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let builder = Self::new(registry).with_general_config(config.general.clone());
        let result = async {
            builder.enter().await?;
            builder.populate_builder(config).await?;
            f(builder.clone()).await
        }
        .await;

        let exited = if builder.state() == BuilderState::Uninitialized {
            Ok(())
        } else {
            builder.exit().await
        };

        match (result, exited) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(exit_error)) => {
                error!("Error releasing builder resources after a failure: {}", exit_error);
                Err(e)
            }
        }
    }

    /// Every evaluator built so far.
    #[must_use]
    pub fn evaluators(&self) -> IndexMap<String, EvaluatorInfo> {
        instances(&self.store().evaluators)
    }

    /// Every span exporter built so far.
    #[must_use]
    pub fn exporters(&self) -> IndexMap<String, Arc<dyn SpanExporter>> {
        instances(&self.store().exporters)
    }

    async fn add_provider(&self, group: ComponentGroup, name: &str, config: ConfigHandle) -> Result<()> {
        self.ensure_open()?;
        self.ensure_free(group, name)?;
        let registry = &self.inner.registry;
        let config_type = config.config_type();
        let registration = match group {
            ComponentGroup::Llms => registry.get_llm_provider(config_type),
            ComponentGroup::Embedders => registry.get_embedder_provider(config_type),
            _ => registry.get_retriever_provider(config_type),
        }
        .map_err(|e| unregistered(&config, &e))?;
        let build_fn = registration.build_fn.clone();

        let built = build_fn(config.clone(), self.handle())
            .await
            .map_err(|e| build_failed(group.singular(), name, &config, e))?;
        let (instance, teardown) = built.into_parts();
        self.push_teardown(format!("{} `{name}`", group.singular()), teardown);

        let mut store = self.store();
        insert_named(
            store.providers_mut(group)?,
            group.singular(),
            name,
            Configured { config, instance },
        )
    }

    fn provider_config(&self, group: ComponentGroup, name: &str) -> Result<ConfigHandle> {
        let mut store = self.store();
        store
            .providers_mut(group)?
            .get(name)
            .map(|provider| provider.config.clone())
            .ok_or_else(|| not_found(group.singular(), name))
    }

    async fn build_client(
        &self,
        label: String,
        config: ConfigHandle,
        build_fn: plexus_core::registry::BuildFn<ClientHandle>,
    ) -> Result<ClientHandle> {
        let built = build_fn(config.clone(), self.handle())
            .await
            .map_err(|e| build_failed("client", &label, &config, e))?;
        let (instance, teardown) = built.into_parts();
        self.push_teardown(label, teardown);
        Ok(instance)
    }

    async fn build_function(&self, name: &str, config: ConfigHandle) -> Result<Arc<dyn Function>> {
        let build_fn = self
            .inner
            .registry
            .get_function(config.config_type())
            .map_err(|e| unregistered(&config, &e))?
            .build_fn
            .clone();

        let child = ChildBuilder::new(self.clone());
        let built = build_fn(config.clone(), Arc::clone(&child) as Arc<dyn Builder>)
            .await
            .map_err(|e| build_failed("function", name, &config, e))?;
        let (artifact, teardown) = built.into_parts();
        self.push_teardown(format!("function `{name}`"), teardown);

        let function = artifact.into_function(name, Some(config))?;
        self.store()
            .dependencies
            .insert(name.to_string(), child.dependencies());
        Ok(function)
    }
}

#[async_trait]
impl Builder for WorkflowBuilder {
    async fn add_function(&self, name: &str, config: ConfigHandle) -> Result<Arc<dyn Function>> {
        self.ensure_open()?;
        self.ensure_free(ComponentGroup::Functions, name)?;
        let function = self.build_function(name, config.clone()).await?;
        insert_named(
            &mut self.store().functions,
            ComponentGroup::Functions.singular(),
            name,
            Configured {
                config,
                instance: Arc::clone(&function),
            },
        )?;
        Ok(function)
    }

    fn get_function(&self, name: &str) -> Result<Arc<dyn Function>> {
        self.store()
            .functions
            .get(name)
            .map(|function| Arc::clone(&function.instance))
            .ok_or_else(|| not_found("Function", name))
    }

    fn get_function_config(&self, name: &str) -> Result<ConfigHandle> {
        self.store()
            .functions
            .get(name)
            .map(|function| function.config.clone())
            .ok_or_else(|| not_found("Function", name))
    }

    async fn set_workflow(&self, config: ConfigHandle) -> Result<Arc<dyn Function>> {
        self.ensure_open()?;
        if self.store().workflow.is_some() {
            warn!("Overwriting existing workflow");
        }
        let function = self.build_function(WORKFLOW_FUNCTION_NAME, config.clone()).await?;
        self.store().workflow = Some(Configured {
            config,
            instance: Arc::clone(&function),
        });
        Ok(function)
    }

    fn get_workflow(&self) -> Result<Arc<dyn Function>> {
        self.store()
            .workflow
            .as_ref()
            .map(|workflow| Arc::clone(&workflow.instance))
            .ok_or(PlexusError::NoWorkflowSet)
    }

    fn get_workflow_config(&self) -> Result<ConfigHandle> {
        self.store()
            .workflow
            .as_ref()
            .map(|workflow| workflow.config.clone())
            .ok_or(PlexusError::NoWorkflowSet)
    }

    fn get_tool(&self, fn_name: &str, framework: &Framework) -> Result<ToolHandle> {
        let function = self.get_function(fn_name)?;
        let wrapper = self.inner.registry.get_tool_wrapper(framework)?;
        (wrapper.build_fn)(fn_name, function, self)
    }

    async fn add_llm(&self, name: &str, config: ConfigHandle) -> Result<()> {
        self.add_provider(ComponentGroup::Llms, name, config).await
    }

    async fn get_llm(&self, name: &str, framework: &Framework) -> Result<ClientHandle> {
        let config = self.provider_config(ComponentGroup::Llms, name)?;
        let build_fn = self
            .inner
            .registry
            .get_llm_client(config.config_type(), framework)
            .map_err(|e| client_lookup_failed("LLM client", name, framework.as_str(), e))?
            .build_fn
            .clone();
        self.build_client(format!("LLM client `{name}` ({framework})"), config, build_fn)
            .await
    }

    fn get_llm_config(&self, name: &str) -> Result<ConfigHandle> {
        self.provider_config(ComponentGroup::Llms, name)
    }

    async fn add_embedder(&self, name: &str, config: ConfigHandle) -> Result<()> {
        self.add_provider(ComponentGroup::Embedders, name, config).await
    }

    async fn get_embedder(&self, name: &str, framework: &Framework) -> Result<ClientHandle> {
        let config = self.provider_config(ComponentGroup::Embedders, name)?;
        let build_fn = self
            .inner
            .registry
            .get_embedder_client(config.config_type(), framework)
            .map_err(|e| client_lookup_failed("embedder client", name, framework.as_str(), e))?
            .build_fn
            .clone();
        self.build_client(format!("embedder client `{name}` ({framework})"), config, build_fn)
            .await
    }

    fn get_embedder_config(&self, name: &str) -> Result<ConfigHandle> {
        self.provider_config(ComponentGroup::Embedders, name)
    }

    async fn add_memory_client(&self, name: &str, config: ConfigHandle) -> Result<()> {
        self.ensure_open()?;
        self.ensure_free(ComponentGroup::Memory, name)?;
        let build_fn = self
            .inner
            .registry
            .get_memory(config.config_type())
            .map_err(|e| unregistered(&config, &e))?
            .build_fn
            .clone();
        let built = build_fn(config.clone(), self.handle())
            .await
            .map_err(|e| build_failed("memory client", name, &config, e))?;
        let (instance, teardown) = built.into_parts();
        self.push_teardown(format!("memory client `{name}`"), teardown);
        insert_named(
            &mut self.store().memory,
            ComponentGroup::Memory.singular(),
            name,
            Configured { config, instance },
        )
    }

    fn get_memory_client(&self, name: &str) -> Result<Arc<dyn MemoryEditor>> {
        self.store()
            .memory
            .get(name)
            .map(|memory| Arc::clone(&memory.instance))
            .ok_or_else(|| not_found("Memory client", name))
    }

    fn get_memory_client_config(&self, name: &str) -> Result<ConfigHandle> {
        self.store()
            .memory
            .get(name)
            .map(|memory| memory.config.clone())
            .ok_or_else(|| not_found("Memory client", name))
    }

    async fn add_retriever(&self, name: &str, config: ConfigHandle) -> Result<()> {
        self.add_provider(ComponentGroup::Retrievers, name, config).await
    }

    async fn get_retriever(&self, name: &str, framework: Option<&Framework>) -> Result<ClientHandle> {
        let config = self.provider_config(ComponentGroup::Retrievers, name)?;
        let build_fn = self
            .inner
            .registry
            .get_retriever_client(config.config_type(), framework)
            .map_err(|e| {
                let framework = framework.map_or("none", Framework::as_str);
                client_lookup_failed("retriever client", name, framework, e)
            })?
            .build_fn
            .clone();
        let label = match framework {
            Some(framework) => format!("retriever client `{name}` ({framework})"),
            None => format!("retriever client `{name}`"),
        };
        self.build_client(label, config, build_fn).await
    }

    fn get_retriever_config(&self, name: &str) -> Result<ConfigHandle> {
        self.provider_config(ComponentGroup::Retrievers, name)
    }

    fn get_function_dependencies(&self, fn_name: &str) -> Result<FunctionDependencies> {
        self.store()
            .dependencies
            .get(fn_name)
            .cloned()
            .ok_or_else(|| not_found("Function", fn_name))
    }
}

#[async_trait]
impl EvalBuilder for WorkflowBuilder {
    async fn add_evaluator(&self, name: &str, config: ConfigHandle) -> Result<()> {
        self.ensure_open()?;
        if self.store().evaluators.contains_key(name) {
            let error = PlexusError::duplicate_name("Evaluator", name);
            error!("{}", error);
            return Err(error);
        }
        let build_fn = self
            .inner
            .registry
            .get_evaluator(config.config_type())
            .map_err(|e| unregistered(&config, &e))?
            .build_fn
            .clone();
        let built = build_fn(config.clone(), Arc::new(self.clone()) as Arc<dyn EvalBuilder>)
            .await
            .map_err(|e| build_failed("evaluator", name, &config, e))?;
        let (instance, teardown) = built.into_parts();
        self.push_teardown(format!("evaluator `{name}`"), teardown);
        insert_named(
            &mut self.store().evaluators,
            "Evaluator",
            name,
            Configured { config, instance },
        )
    }

    fn get_evaluator(&self, name: &str) -> Result<EvaluatorInfo> {
        self.store()
            .evaluators
            .get(name)
            .map(|evaluator| evaluator.instance.clone())
            .ok_or_else(|| not_found("Evaluator", name))
    }

    fn get_evaluator_config(&self, name: &str) -> Result<ConfigHandle> {
        self.store()
            .evaluators
            .get(name)
            .map(|evaluator| evaluator.config.clone())
            .ok_or_else(|| not_found("Evaluator", name))
    }

    fn get_max_concurrency(&self) -> i64 {
        self.store().eval_general.max_concurrency
    }

    fn get_output_dir(&self) -> PathBuf {
        self.store().eval_general.output_dir.clone()
    }

    fn get_all_tools(&self, framework: &Framework) -> Result<Vec<ToolHandle>> {
        let names: Vec<String> = self.store().functions.keys().cloned().collect();
        let tools = names
            .iter()
            .filter_map(|name| match self.get_tool(name, framework) {
                Ok(tool) => Some(tool),
                Err(e) => {
                    warn!("Error fetching tool `{}`: {}", name, e);
                    None
                }
            })
            .collect();
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{
        Built, FunctionArtifact, TypedConfig, config::config_handle,
        registry::RegisteredFunctionInfo,
    };
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct UpperConfig {}

    impl TypedConfig for UpperConfig {
        const TYPE_NAME: &'static str = "upper";
    }

    fn registry() -> Arc<TypeRegistry> {
        let mut registry = TypeRegistry::new();
        registry
            .register_function(RegisteredFunctionInfo::new(
                |_config: Arc<UpperConfig>, _builder| async move {
                    Ok::<_, PlexusError>(Built::new(FunctionArtifact::callable(|x: String| async move {
                        Ok::<_, PlexusError>(x.to_uppercase())
                    })))
                },
            ))
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_enter_twice_fails() {
        let builder = WorkflowBuilder::new(registry());
        builder.enter().await.unwrap();
        let err = builder.enter().await.unwrap_err();
        assert!(matches!(err, PlexusError::InvalidState { .. }));
        builder.exit().await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_requires_enter() {
        let builder = WorkflowBuilder::new(registry());
        assert!(matches!(
            builder.exit().await,
            Err(PlexusError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_build_without_workflow() {
        let builder = WorkflowBuilder::new(registry());
        builder.enter().await.unwrap();
        builder
            .add_function("upper", config_handle(UpperConfig {}))
            .await
            .unwrap();
        assert!(matches!(builder.build(), Err(PlexusError::NoWorkflowSet)));
        builder.exit().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_requires_enter() {
        let builder = WorkflowBuilder::new(registry());
        let err = builder
            .add_function("upper", config_handle(UpperConfig {}))
            .await
            .unwrap_err();
        assert!(matches!(err, PlexusError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_unregistered_function_config() {
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        struct UnknownConfig {}

        impl TypedConfig for UnknownConfig {
            const TYPE_NAME: &'static str = "unknown";
        }

        let builder = WorkflowBuilder::new(registry());
        builder.enter().await.unwrap();
        let err = builder
            .add_function("unknown", config_handle(UnknownConfig {}))
            .await
            .unwrap_err();
        assert!(matches!(err, PlexusError::UnregisteredConfig { .. }));
        assert!(err.to_string().contains("unknown"));
        builder.exit().await.unwrap();
    }
}
