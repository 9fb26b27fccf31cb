//! Component kinds, groups and name references.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString};

/// Every kind of component the type registry knows about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComponentKind {
    /// A front end that serves a workflow (console, HTTP, ...)
    FrontEnd,
    /// A function, including the workflow entry function
    Function,
    /// Adapter turning a function into a framework-specific tool
    ToolWrapper,
    /// LLM backend descriptor
    LlmProvider,
    /// Framework-specific LLM client
    LlmClient,
    /// Embedder backend descriptor
    EmbedderProvider,
    /// Framework-specific embedder client
    EmbedderClient,
    /// Evaluator used by evaluation runs
    Evaluator,
    /// Memory backend
    Memory,
    /// Retriever backend descriptor
    RetrieverProvider,
    /// Framework-specific retriever client
    RetrieverClient,
    /// Handler for remote component registries
    RegistryHandler,
    /// Logging method
    Logging,
    /// Telemetry (span) exporter
    Tracing,
    /// Installed plugin package
    Package,
    /// Unknown kind, used by failed discovery metadata
    Undefined,
}

/// Named component groups of a declarative configuration.
///
/// Only groups whose members can reference each other by name take part in
/// build ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComponentGroup {
    /// `embedders:` map
    Embedders,
    /// `functions:` map
    Functions,
    /// `llms:` map
    Llms,
    /// `memory:` map
    Memory,
    /// `retrievers:` map
    Retrievers,
}

impl ComponentGroup {
    /// Human readable singular name used in error messages.
    #[must_use]
    pub fn singular(self) -> &'static str {
        match self {
            Self::Embedders => "Embedder",
            Self::Functions => "Function",
            Self::Llms => "LLM",
            Self::Memory => "Memory client",
            Self::Retrievers => "Retriever",
        }
    }
}

/// A name that refers to another component of a given group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Group the referenced component lives in
    pub group: ComponentGroup,
    /// Name of the referenced component
    pub name: String,
}

impl ComponentRef {
    /// Create a reference to `name` in `group`.
    pub fn new(group: ComponentGroup, name: impl Into<String>) -> Self {
        Self {
            group,
            name: name.into(),
        }
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

macro_rules! component_ref {
    ($(#[$meta:meta])* $name:ident => $group:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Group this reference points into.
            pub const GROUP: ComponentGroup = ComponentGroup::$group;

            /// Referenced component name.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Untyped form used for dependency ordering.
            #[must_use]
            pub fn component_ref(&self) -> ComponentRef {
                ComponentRef::new(Self::GROUP, self.0.clone())
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

component_ref!(
    /// Reference to an entry of the `llms:` map.
    LlmRef => Llms
);
component_ref!(
    /// Reference to an entry of the `functions:` map.
    FunctionRef => Functions
);
component_ref!(
    /// Reference to an entry of the `embedders:` map.
    EmbedderRef => Embedders
);
component_ref!(
    /// Reference to an entry of the `memory:` map.
    MemoryRef => Memory
);
component_ref!(
    /// Reference to an entry of the `retrievers:` map.
    RetrieverRef => Retrievers
);

/// Target framework key used to select client adapters and tool wrappers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Framework(String);

impl Framework {
    /// `LangChain` adapters.
    pub const LANGCHAIN: &'static str = "langchain";
    /// `LlamaIndex` adapters.
    pub const LLAMA_INDEX: &'static str = "llama_index";
    /// `CrewAI` adapters.
    pub const CREWAI: &'static str = "crewai";
    /// Semantic Kernel adapters.
    pub const SEMANTIC_KERNEL: &'static str = "semantic_kernel";
    /// Agno adapters.
    pub const AGNO: &'static str = "agno";

    /// Create a framework key.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Framework key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Framework {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Framework {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kind_names() {
        assert_eq!(ComponentKind::LlmClient.to_string(), "llm_client");
        assert_eq!(
            ComponentKind::from_str("retriever_provider").unwrap(),
            ComponentKind::RetrieverProvider
        );
    }

    #[test]
    fn test_typed_refs() {
        let llm = LlmRef::from("llm1");
        assert_eq!(llm.component_ref(), ComponentRef::new(ComponentGroup::Llms, "llm1"));
        assert_eq!(serde_json::to_value(&llm).unwrap(), serde_json::json!("llm1"));
        assert_eq!(FunctionRef::GROUP, ComponentGroup::Functions);
    }
}
