//! Error types for the Plexus runtime.
//!
//! Configuration mistakes are the dominant failure mode of a plugin system, so
//! every variant carries enough context (names, types, valid alternatives) to
//! be actionable without further investigation.

use thiserror::Error;

/// Core error type shared by every Plexus crate.
#[derive(Error, Debug)]
pub enum PlexusError {
    /// I/O related errors (config files, evaluation output, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A registration key was registered twice
    #[error("Duplicate registration: {kind} `{key}` is already registered")]
    DuplicateRegistration {
        /// Component kind of the registration
        kind: String,
        /// Key that collided
        key: String,
    },

    /// Lookup of a named resource failed
    #[error("Not found: {resource}")]
    NotFound {
        /// Description of the missing resource, including known alternatives
        resource: String,
    },

    /// No builder is registered for a configuration type
    #[error("Unregistered config type `{config_type}`: {message}")]
    UnregisteredConfig {
        /// Full type name of the configuration
        config_type: String,
        /// Detailed error message
        message: String,
    },

    /// Two components were added under the same name
    #[error("{group} `{name}` already exists")]
    DuplicateName {
        /// Component group (function, llm, ...)
        group: String,
        /// Duplicated name
        name: String,
    },

    /// Named components reference each other in a cycle
    #[error("Configuration cycle detected: {message}")]
    ConfigurationCycle {
        /// Detailed error message
        message: String,
    },

    /// No client exists for a (provider config type, framework) pair
    #[error("Incompatible framework: {message}")]
    IncompatibleFramework {
        /// Detailed error message
        message: String,
    },

    /// A function build yielded something that is not a function
    #[error("Build contract violation: {message}")]
    BuildContract {
        /// Detailed error message
        message: String,
    },

    /// `build` was called before a workflow entry was set
    #[error("Must set a workflow before building")]
    NoWorkflowSet,

    /// A function was invoked in an output mode it does not support
    #[error("Unsupported output mode: {message}")]
    UnsupportedOutputMode {
        /// Detailed error message
        message: String,
    },

    /// A lifecycle state machine was driven out of order
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Detailed error message
        message: String,
    },

    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// Detailed error message
        message: String,
    },

    /// Input validation errors
    #[error("Validation error: {message}")]
    Validation {
        /// Detailed error message
        message: String,
    },

    /// Value conversion errors
    #[error("Conversion error: {message}")]
    Conversion {
        /// Detailed error message
        message: String,
    },

    /// Internal runtime errors
    #[error("Internal error: {message}")]
    Internal {
        /// Detailed error message
        message: String,
    },

    /// Errors raised by plugin or user code
    #[error("External error: {source}")]
    External {
        /// The underlying error
        #[source]
        source: anyhow::Error,
    },
}

impl PlexusError {
    /// Create a new duplicate registration error.
    pub fn duplicate_registration<K: Into<String>, S: Into<String>>(kind: K, key: S) -> Self {
        Self::DuplicateRegistration {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Create a new not found error with a resource description.
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a new unregistered config error.
    pub fn unregistered_config<T: Into<String>, S: Into<String>>(config_type: T, message: S) -> Self {
        Self::UnregisteredConfig {
            config_type: config_type.into(),
            message: message.into(),
        }
    }

    /// Create a new duplicate name error.
    pub fn duplicate_name<G: Into<String>, S: Into<String>>(group: G, name: S) -> Self {
        Self::DuplicateName {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Create a new configuration cycle error.
    pub fn configuration_cycle<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationCycle {
            message: message.into(),
        }
    }

    /// Create a new incompatible framework error.
    pub fn incompatible_framework<S: Into<String>>(message: S) -> Self {
        Self::IncompatibleFramework {
            message: message.into(),
        }
    }

    /// Create a new build contract error.
    pub fn build_contract<S: Into<String>>(message: S) -> Self {
        Self::BuildContract {
            message: message.into(),
        }
    }

    /// Create a new unsupported output mode error.
    pub fn unsupported_output_mode<S: Into<String>>(message: S) -> Self {
        Self::UnsupportedOutputMode {
            message: message.into(),
        }
    }

    /// Create a new invalid state error.
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a new configuration error with a message.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new validation error with a message.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new conversion error with a message.
    pub fn conversion<S: Into<String>>(message: S) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    /// Create a new internal error with a message.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new external error from any error that implements `Into<anyhow::Error>`.
    pub fn external<E: Into<anyhow::Error>>(error: E) -> Self {
        Self::External {
            source: error.into(),
        }
    }

    /// Get the error category for logging and metrics.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::DuplicateRegistration { .. } => "duplicate_registration",
            Self::NotFound { .. } => "not_found",
            Self::UnregisteredConfig { .. } => "unregistered_config",
            Self::DuplicateName { .. } => "duplicate_name",
            Self::ConfigurationCycle { .. } => "configuration_cycle",
            Self::IncompatibleFramework { .. } => "incompatible_framework",
            Self::BuildContract { .. } => "build_contract",
            Self::NoWorkflowSet => "no_workflow_set",
            Self::UnsupportedOutputMode { .. } => "unsupported_output_mode",
            Self::InvalidState { .. } => "invalid_state",
            Self::Configuration { .. } => "configuration",
            Self::Validation { .. } => "validation",
            Self::Conversion { .. } => "conversion",
            Self::Internal { .. } => "internal",
            Self::External { .. } => "external",
        }
    }

    /// Check if this error is a configuration mistake surfaced at build time.
    ///
    /// These never succeed on retry and should be reported to the user with
    /// the full message.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRegistration { .. }
                | Self::UnregisteredConfig { .. }
                | Self::DuplicateName { .. }
                | Self::ConfigurationCycle { .. }
                | Self::IncompatibleFramework { .. }
                | Self::BuildContract { .. }
                | Self::NoWorkflowSet
                | Self::Configuration { .. }
        )
    }
}

/// Convert from `anyhow::Error` to `PlexusError`.
///
/// An `anyhow::Error` that already wraps a `PlexusError` is unwrapped instead
/// of being nested.
impl From<anyhow::Error> for PlexusError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<PlexusError>() {
            Ok(inner) => inner,
            Err(source) => Self::External { source },
        }
    }
}

impl From<toml::de::Error> for PlexusError {
    fn from(error: toml::de::Error) -> Self {
        Self::configuration(format!("Invalid TOML document: {error}"))
    }
}

/// Result type alias for convenience.
pub type Result<T, E = PlexusError> = std::result::Result<T, E>;
