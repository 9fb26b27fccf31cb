//! Function descriptors and build artifacts.

use futures::{
    FutureExt, Stream, StreamExt,
    future::BoxFuture,
    stream::{self, BoxStream},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{any::Any, fmt, future::Future, sync::Arc};

use crate::{
    Result,
    context::Context,
    error::PlexusError,
    function::{Function, TypeConverter},
};

/// Stream of function outputs.
pub type ValueStream = BoxStream<'static, Result<Value>>;

/// Type-erased single-shot body.
pub type SingleFn = Arc<dyn Fn(Context, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Type-erased streaming body.
pub type StreamFn = Arc<dyn Fn(Context, Value) -> ValueStream + Send + Sync>;

fn user_error<E: Into<anyhow::Error>>(error: E) -> PlexusError {
    let error: anyhow::Error = error.into();
    PlexusError::from(error)
}

fn erase_single<I, O, E, F, Fut>(f: F) -> SingleFn
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
    F: Fn(Context, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
{
    let converter = TypeConverter::new();
    Arc::new(move |context, input| {
        let call = converter.convert::<I>(input).map(|decoded| f(context, decoded));
        async move {
            let output = call?.await.map_err(user_error)?;
            Ok(serde_json::to_value(output)?)
        }
        .boxed()
    })
}

fn erase_stream<I, O, E, F, S>(f: F) -> StreamFn
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
    F: Fn(Context, I) -> S + Send + Sync + 'static,
    S: Stream<Item = std::result::Result<O, E>> + Send + 'static,
{
    let converter = TypeConverter::new();
    Arc::new(move |context, input| match converter.convert::<I>(input) {
        Ok(decoded) => f(context, decoded)
            .map(|item| {
                item.map_err(user_error)
                    .and_then(|output| serde_json::to_value(output).map_err(PlexusError::from))
            })
            .boxed(),
        Err(e) => stream::once(async move { Err(e) }).boxed(),
    })
}

/// Structured description of a function: its bodies, declared types,
/// description and conversions.
///
/// At least one of the single-shot and streaming bodies must be present.
#[derive(Clone)]
pub struct FunctionInfo {
    single_fn: Option<SingleFn>,
    stream_fn: Option<StreamFn>,
    description: Option<String>,
    input_type: &'static str,
    single_output_type: Option<&'static str>,
    stream_output_type: Option<&'static str>,
    converter: TypeConverter,
}

impl fmt::Debug for FunctionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionInfo")
            .field("description", &self.description)
            .field("input_type", &self.input_type)
            .field("single_output_type", &self.single_output_type)
            .field("stream_output_type", &self.stream_output_type)
            .finish_non_exhaustive()
    }
}

impl FunctionInfo {
    fn empty(input_type: &'static str) -> Self {
        Self {
            single_fn: None,
            stream_fn: None,
            description: None,
            input_type,
            single_output_type: None,
            stream_output_type: None,
            converter: TypeConverter::new(),
        }
    }

    /// Describe a single-shot function that does not need the run context.
    pub fn from_fn<I, O, E, F, Fut>(f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
    {
        Self::from_context_fn(move |_context: Context, input: I| f(input))
    }

    /// Describe a single-shot function receiving the run context.
    pub fn from_context_fn<I, O, E, F, Fut>(f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
    {
        let mut info = Self::empty(std::any::type_name::<I>());
        info.single_fn = Some(erase_single(f));
        info.single_output_type = Some(std::any::type_name::<O>());
        info
    }

    /// Describe a streaming-only function that does not need the run context.
    pub fn from_stream_fn<I, O, E, F, S>(f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: Fn(I) -> S + Send + Sync + 'static,
        S: Stream<Item = std::result::Result<O, E>> + Send + 'static,
    {
        Self::from_context_stream_fn(move |_context: Context, input: I| f(input))
    }

    /// Describe a streaming-only function receiving the run context.
    pub fn from_context_stream_fn<I, O, E, F, S>(f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: Fn(Context, I) -> S + Send + Sync + 'static,
        S: Stream<Item = std::result::Result<O, E>> + Send + 'static,
    {
        let mut info = Self::empty(std::any::type_name::<I>());
        info.stream_fn = Some(erase_stream(f));
        info.stream_output_type = Some(std::any::type_name::<O>());
        info
    }

    /// Add a streaming body to a single-shot description.
    #[must_use]
    pub fn with_stream_fn<I, O, E, F, S>(mut self, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: Fn(I) -> S + Send + Sync + 'static,
        S: Stream<Item = std::result::Result<O, E>> + Send + 'static,
    {
        self.stream_fn = Some(erase_stream(move |_context: Context, input: I| f(input)));
        self.stream_output_type = Some(std::any::type_name::<O>());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add conversions available to callers of this function.
    #[must_use]
    pub fn with_converter(mut self, converter: &TypeConverter) -> Self {
        self.converter = self.converter.merge(converter);
        self
    }

    /// Description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declared input type.
    #[must_use]
    pub fn input_type(&self) -> &'static str {
        self.input_type
    }

    /// Declared single-shot output type.
    #[must_use]
    pub fn single_output_type(&self) -> Option<&'static str> {
        self.single_output_type
    }

    /// Declared streaming output type.
    #[must_use]
    pub fn stream_output_type(&self) -> Option<&'static str> {
        self.stream_output_type
    }

    /// Conversions of this function.
    #[must_use]
    pub fn converter(&self) -> &TypeConverter {
        &self.converter
    }

    pub(crate) fn single_fn(&self) -> Option<&SingleFn> {
        self.single_fn.as_ref()
    }

    pub(crate) fn stream_fn(&self) -> Option<&StreamFn> {
        self.stream_fn.as_ref()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.single_fn.is_none() && self.stream_fn.is_none() {
            return Err(PlexusError::build_contract(
                "A function must provide a single-shot or a streaming body",
            ));
        }
        Ok(())
    }
}

/// A bare closure yielded by a function build; its types are inferred from
/// the closure signature.
#[derive(Clone, Debug)]
pub struct Callable(FunctionInfo);

impl Callable {
    /// Wrap an async closure `I -> Result<O>`.
    pub fn new<I, O, E, F, Fut>(f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
    {
        Self(FunctionInfo::from_fn(f))
    }
}

impl From<Callable> for FunctionInfo {
    fn from(callable: Callable) -> Self {
        callable.0
    }
}

/// The single object a function build yields.
pub enum FunctionArtifact {
    /// A bare closure
    Callable(Callable),
    /// A structured descriptor
    Info(FunctionInfo),
    /// A fully formed function object
    Function(Arc<dyn Function>),
    /// Anything else; rejected when the builder normalizes the artifact
    Other {
        /// Rust type name of the yielded value
        type_name: &'static str,
        /// The yielded value
        value: Box<dyn Any + Send + Sync>,
    },
}

impl fmt::Debug for FunctionArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callable(callable) => f.debug_tuple("Callable").field(callable).finish(),
            Self::Info(info) => f.debug_tuple("Info").field(info).finish(),
            Self::Function(function) => f.debug_tuple("Function").field(&function.instance_name()).finish(),
            Self::Other { type_name, .. } => f.debug_struct("Other").field("type_name", type_name).finish(),
        }
    }
}

impl FunctionArtifact {
    /// Yield a bare closure.
    pub fn callable<I, O, E, F, Fut>(f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
    {
        Self::Callable(Callable::new(f))
    }

    /// Yield an arbitrary value.
    pub fn other<T: Any + Send + Sync>(value: T) -> Self {
        Self::Other {
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        }
    }
}

impl From<Callable> for FunctionArtifact {
    fn from(callable: Callable) -> Self {
        Self::Callable(callable)
    }
}

impl From<FunctionInfo> for FunctionArtifact {
    fn from(info: FunctionInfo) -> Self {
        Self::Info(info)
    }
}

impl From<Arc<dyn Function>> for FunctionArtifact {
    fn from(function: Arc<dyn Function>) -> Self {
        Self::Function(function)
    }
}
