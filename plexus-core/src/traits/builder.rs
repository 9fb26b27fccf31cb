//! The builder handle handed to component builds.

use async_trait::async_trait;
use futures::{FutureExt, future::BoxFuture, future::try_join_all};
use std::{any::Any, path::PathBuf, sync::Arc};

use crate::{
    Result,
    config::ConfigHandle,
    error::PlexusError,
    function::Function,
    traits::{EvaluatorInfo, MemoryEditor},
    types::{Framework, FunctionDependencies},
};

/// A framework-specific client (LLM, embedder or retriever).
pub type ClientHandle = Arc<dyn Any + Send + Sync>;

/// A function wrapped as a framework-specific tool.
pub type ToolHandle = Arc<dyn Any + Send + Sync>;

/// Access to the components of a workflow under construction.
///
/// Component builds receive a `Builder` to fetch the components they depend
/// on. Names are the keys of the declarative configuration maps. Every
/// lookup of a missing name fails instead of returning a default.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Build a function and add it under `name`.
    async fn add_function(&self, name: &str, config: ConfigHandle) -> Result<Arc<dyn Function>>;

    /// A previously added function.
    fn get_function(&self, name: &str) -> Result<Arc<dyn Function>>;

    /// Several previously added functions.
    fn get_functions(&self, names: &[&str]) -> Result<Vec<Arc<dyn Function>>> {
        names.iter().map(|name| self.get_function(name)).collect()
    }

    /// Configuration a function was built from.
    fn get_function_config(&self, name: &str) -> Result<ConfigHandle>;

    /// Build the workflow entry function.
    ///
    /// Setting the entry twice replaces the first one with a warning.
    async fn set_workflow(&self, config: ConfigHandle) -> Result<Arc<dyn Function>>;

    /// The workflow entry function.
    fn get_workflow(&self) -> Result<Arc<dyn Function>>;

    /// Configuration of the workflow entry function.
    fn get_workflow_config(&self) -> Result<ConfigHandle>;

    /// A function wrapped as a tool for `framework`.
    fn get_tool(&self, fn_name: &str, framework: &Framework) -> Result<ToolHandle>;

    /// Several functions wrapped as tools for `framework`.
    fn get_tools(&self, fn_names: &[&str], framework: &Framework) -> Result<Vec<ToolHandle>> {
        fn_names
            .iter()
            .map(|name| self.get_tool(name, framework))
            .collect()
    }

    /// Build an LLM provider and add it under `name`.
    async fn add_llm(&self, name: &str, config: ConfigHandle) -> Result<()>;

    /// A client of the named LLM for `framework`.
    async fn get_llm(&self, name: &str, framework: &Framework) -> Result<ClientHandle>;

    /// Clients of several LLMs for `framework`.
    async fn get_llms(&self, names: &[&str], framework: &Framework) -> Result<Vec<ClientHandle>> {
        try_join_all(names.iter().map(|name| self.get_llm(name, framework))).await
    }

    /// Configuration of the named LLM.
    fn get_llm_config(&self, name: &str) -> Result<ConfigHandle>;

    /// Build an embedder provider and add it under `name`.
    async fn add_embedder(&self, name: &str, config: ConfigHandle) -> Result<()>;

    /// A client of the named embedder for `framework`.
    async fn get_embedder(&self, name: &str, framework: &Framework) -> Result<ClientHandle>;

    /// Clients of several embedders for `framework`.
    async fn get_embedders(&self, names: &[&str], framework: &Framework) -> Result<Vec<ClientHandle>> {
        try_join_all(names.iter().map(|name| self.get_embedder(name, framework))).await
    }

    /// Configuration of the named embedder.
    fn get_embedder_config(&self, name: &str) -> Result<ConfigHandle>;

    /// Build a memory client and add it under `name`.
    async fn add_memory_client(&self, name: &str, config: ConfigHandle) -> Result<()>;

    /// The named memory client.
    fn get_memory_client(&self, name: &str) -> Result<Arc<dyn MemoryEditor>>;

    /// Several memory clients.
    fn get_memory_clients(&self, names: &[&str]) -> Result<Vec<Arc<dyn MemoryEditor>>> {
        names.iter().map(|name| self.get_memory_client(name)).collect()
    }

    /// Configuration of the named memory client.
    fn get_memory_client_config(&self, name: &str) -> Result<ConfigHandle>;

    /// Build a retriever provider and add it under `name`.
    async fn add_retriever(&self, name: &str, config: ConfigHandle) -> Result<()>;

    /// A client of the named retriever, framework-agnostic when `framework`
    /// is `None`.
    async fn get_retriever(&self, name: &str, framework: Option<&Framework>) -> Result<ClientHandle>;

    /// Configuration of the named retriever.
    fn get_retriever_config(&self, name: &str) -> Result<ConfigHandle>;

    /// Components the named function requested while it was built.
    fn get_function_dependencies(&self, fn_name: &str) -> Result<FunctionDependencies>;
}

/// Typed access to framework clients.
pub trait BuilderExt: Builder {
    /// A client of the named LLM, downcast to `T`.
    fn get_llm_as<'a, T: Any + Send + Sync>(
        &'a self,
        name: &'a str,
        framework: &'a Framework,
    ) -> BoxFuture<'a, Result<Arc<T>>> {
        async move { downcast_client(self.get_llm(name, framework).await?, "LLM", name) }.boxed()
    }

    /// A client of the named embedder, downcast to `T`.
    fn get_embedder_as<'a, T: Any + Send + Sync>(
        &'a self,
        name: &'a str,
        framework: &'a Framework,
    ) -> BoxFuture<'a, Result<Arc<T>>> {
        async move { downcast_client(self.get_embedder(name, framework).await?, "Embedder", name) }
            .boxed()
    }

    /// A client of the named retriever, downcast to `T`.
    fn get_retriever_as<'a, T: Any + Send + Sync>(
        &'a self,
        name: &'a str,
        framework: Option<&'a Framework>,
    ) -> BoxFuture<'a, Result<Arc<T>>> {
        async move { downcast_client(self.get_retriever(name, framework).await?, "Retriever", name) }
            .boxed()
    }
}

impl<B: Builder + ?Sized> BuilderExt for B {}

fn downcast_client<T: Any + Send + Sync>(client: ClientHandle, group: &str, name: &str) -> Result<Arc<T>> {
    client.downcast::<T>().map_err(|_| {
        PlexusError::conversion(format!(
            "{group} client `{name}` is not a `{}`",
            std::any::type_name::<T>()
        ))
    })
}

/// Builder used while an evaluation run is prepared.
#[async_trait]
pub trait EvalBuilder: Builder {
    /// Build an evaluator and add it under `name`.
    async fn add_evaluator(&self, name: &str, config: ConfigHandle) -> Result<()>;

    /// The named evaluator.
    fn get_evaluator(&self, name: &str) -> Result<EvaluatorInfo>;

    /// Configuration of the named evaluator.
    fn get_evaluator_config(&self, name: &str) -> Result<ConfigHandle>;

    /// Maximum number of dataset items evaluated concurrently.
    fn get_max_concurrency(&self) -> i64;

    /// Directory evaluation results are written to.
    fn get_output_dir(&self) -> PathBuf;

    /// Every function wrapped as a tool for `framework`.
    ///
    /// Functions that cannot be wrapped are logged and skipped.
    fn get_all_tools(&self, framework: &Framework) -> Result<Vec<ToolHandle>>;
}
