//! Dependency-recording builder handed to function builds.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

use plexus_core::{
    Builder, ConfigHandle, Function, Result,
    traits::{ClientHandle, MemoryEditor, ToolHandle},
    types::{ComponentGroup, Framework, FunctionDependencies},
};

use super::WorkflowBuilder;

/// Wraps the workflow builder while one function is being built and records
/// every component the build asks for.
pub(crate) struct ChildBuilder {
    parent: WorkflowBuilder,
    dependencies: Mutex<FunctionDependencies>,
}

impl ChildBuilder {
    pub(crate) fn new(parent: WorkflowBuilder) -> Arc<Self> {
        Arc::new(Self {
            parent,
            dependencies: Mutex::new(FunctionDependencies::default()),
        })
    }

    fn record(&self, group: ComponentGroup, name: &str) {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(group, name);
    }

    pub(crate) fn dependencies(&self) -> FunctionDependencies {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Builder for ChildBuilder {
    async fn add_function(&self, name: &str, config: ConfigHandle) -> Result<Arc<dyn Function>> {
        self.parent.add_function(name, config).await
    }

    fn get_function(&self, name: &str) -> Result<Arc<dyn Function>> {
        self.record(ComponentGroup::Functions, name);
        self.parent.get_function(name)
    }

    fn get_function_config(&self, name: &str) -> Result<ConfigHandle> {
        self.parent.get_function_config(name)
    }

    async fn set_workflow(&self, config: ConfigHandle) -> Result<Arc<dyn Function>> {
        self.parent.set_workflow(config).await
    }

    fn get_workflow(&self) -> Result<Arc<dyn Function>> {
        self.parent.get_workflow()
    }

    fn get_workflow_config(&self) -> Result<ConfigHandle> {
        self.parent.get_workflow_config()
    }

    fn get_tool(&self, fn_name: &str, framework: &Framework) -> Result<ToolHandle> {
        self.record(ComponentGroup::Functions, fn_name);
        self.parent.get_tool(fn_name, framework)
    }

    async fn add_llm(&self, name: &str, config: ConfigHandle) -> Result<()> {
        self.parent.add_llm(name, config).await
    }

    async fn get_llm(&self, name: &str, framework: &Framework) -> Result<ClientHandle> {
        self.record(ComponentGroup::Llms, name);
        self.parent.get_llm(name, framework).await
    }

    fn get_llm_config(&self, name: &str) -> Result<ConfigHandle> {
        self.parent.get_llm_config(name)
    }

    async fn add_embedder(&self, name: &str, config: ConfigHandle) -> Result<()> {
        self.parent.add_embedder(name, config).await
    }

    async fn get_embedder(&self, name: &str, framework: &Framework) -> Result<ClientHandle> {
        self.record(ComponentGroup::Embedders, name);
        self.parent.get_embedder(name, framework).await
    }

    fn get_embedder_config(&self, name: &str) -> Result<ConfigHandle> {
        self.parent.get_embedder_config(name)
    }

    async fn add_memory_client(&self, name: &str, config: ConfigHandle) -> Result<()> {
        self.parent.add_memory_client(name, config).await
    }

    fn get_memory_client(&self, name: &str) -> Result<Arc<dyn MemoryEditor>> {
        self.record(ComponentGroup::Memory, name);
        self.parent.get_memory_client(name)
    }

    fn get_memory_client_config(&self, name: &str) -> Result<ConfigHandle> {
        self.parent.get_memory_client_config(name)
    }

    async fn add_retriever(&self, name: &str, config: ConfigHandle) -> Result<()> {
        self.parent.add_retriever(name, config).await
    }

    async fn get_retriever(&self, name: &str, framework: Option<&Framework>) -> Result<ClientHandle> {
        self.record(ComponentGroup::Retrievers, name);
        self.parent.get_retriever(name, framework).await
    }

    fn get_retriever_config(&self, name: &str) -> Result<ConfigHandle> {
        self.parent.get_retriever_config(name)
    }

    fn get_function_dependencies(&self, fn_name: &str) -> Result<FunctionDependencies> {
        self.parent.get_function_dependencies(fn_name)
    }
}
