//! Component configurations and the declarative workflow document.

pub mod source;
pub mod typed;
pub mod workflow;

pub use source::{ConfigFormat, read_config_file, substitute_env_variables};
pub use typed::{AnyConfig, ConfigHandle, ConfigType, TYPE_TAG, TypedConfig, config_handle, downcast_config};
pub use workflow::{
    ComponentMap, DatasetConfig, EvalConfig, EvalGeneralConfig, GeneralConfig, TelemetryConfig,
    WorkflowConfig,
};
