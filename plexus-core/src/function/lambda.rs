//! Function objects backed by a [`FunctionInfo`].

use async_trait::async_trait;
use serde_json::Value;
use std::{fmt, sync::Arc};

use crate::{
    Result,
    config::ConfigHandle,
    context::Context,
    error::PlexusError,
    function::{Function, FunctionArtifact, FunctionInfo, TypeConverter, ValueStream},
};

/// A named function whose bodies come from a [`FunctionInfo`].
pub struct LambdaFunction {
    name: String,
    config: Option<ConfigHandle>,
    info: FunctionInfo,
}

impl fmt::Debug for LambdaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaFunction")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("info", &self.info)
            .finish()
    }
}

impl LambdaFunction {
    /// Create a function named `name`.
    pub fn new(
        name: impl Into<String>,
        config: Option<ConfigHandle>,
        info: FunctionInfo,
    ) -> Result<Self> {
        info.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            info,
        })
    }

    /// The descriptor backing this function.
    #[must_use]
    pub fn info(&self) -> &FunctionInfo {
        &self.info
    }
}

#[async_trait]
impl Function for LambdaFunction {
    fn instance_name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> Option<&ConfigHandle> {
        self.config.as_ref()
    }

    fn description(&self) -> Option<&str> {
        self.info.description()
    }

    fn input_type(&self) -> &'static str {
        self.info.input_type()
    }

    fn single_output_type(&self) -> Option<&'static str> {
        self.info.single_output_type()
    }

    fn stream_output_type(&self) -> Option<&'static str> {
        self.info.stream_output_type()
    }

    fn converter(&self) -> &TypeConverter {
        self.info.converter()
    }

    async fn invoke(&self, context: &Context, input: Value) -> Result<Value> {
        match self.info.single_fn() {
            Some(body) => body(context.clone(), input).await,
            None => Err(PlexusError::unsupported_output_mode(format!(
                "Function `{}` does not support single output",
                self.name
            ))),
        }
    }

    fn stream(&self, context: &Context, input: Value) -> Result<ValueStream> {
        match self.info.stream_fn() {
            Some(body) => Ok(body(context.clone(), input)),
            None => Err(PlexusError::unsupported_output_mode(format!(
                "Function `{}` does not support streaming output",
                self.name
            ))),
        }
    }
}

impl FunctionArtifact {
    /// Normalize the artifact into a function object named `name`.
    pub fn into_function(
        self,
        name: &str,
        config: Option<ConfigHandle>,
    ) -> Result<Arc<dyn Function>> {
        match self {
            Self::Callable(callable) => {
                Ok(Arc::new(LambdaFunction::new(name, config, callable.into())?))
            }
            Self::Info(info) => Ok(Arc::new(LambdaFunction::new(name, config, info)?)),
            Self::Function(function) => Ok(function),
            Self::Other { type_name, .. } => Err(PlexusError::build_contract(format!(
                "Expected a callable, a FunctionInfo or a Function object for `{name}`, \
                 instead got `{type_name}`"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Callable;

    #[test]
    fn test_normalize_callable_and_info() {
        let function = FunctionArtifact::from(Callable::new(|x: String| async move {
            Ok::<_, PlexusError>(x)
        }))
        .into_function("echo", None)
        .unwrap();
        assert_eq!(function.instance_name(), "echo");
        assert!(function.has_single_output());
        assert!(!function.has_streaming_output());
    }

    #[test]
    fn test_normalize_rejects_other_values() {
        let err = FunctionArtifact::other(42_u8)
            .into_function("broken", None)
            .unwrap_err();
        assert!(matches!(err, PlexusError::BuildContract { .. }));
        assert!(err.to_string().contains("u8"));
    }
}
