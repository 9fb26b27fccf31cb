//! Discovery metadata attached to every registration.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::types::{ComponentKind, Framework};

/// Outcome of collecting discovery metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscoveryStatus {
    /// Metadata was collected
    #[default]
    Success,
    /// Metadata could not be collected
    Failure,
}

/// Metadata describing a registered component, used by search and listing
/// tools rather than by execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryMetadata {
    /// Package providing the component
    pub package: String,
    /// Version of that package
    pub version: String,
    /// Kind of the component
    pub component_type: ComponentKind,
    /// Registered name of the component
    pub component_name: String,
    /// Human readable description
    pub description: String,
    /// Extra notes for developers
    pub developer_notes: String,
    /// Whether collection succeeded
    pub status: DiscoveryStatus,
}

impl Default for DiscoveryMetadata {
    fn default() -> Self {
        Self {
            package: String::new(),
            version: String::new(),
            component_type: ComponentKind::Undefined,
            component_name: String::new(),
            description: String::new(),
            developer_notes: String::new(),
            status: DiscoveryStatus::Success,
        }
    }
}

impl DiscoveryMetadata {
    /// Metadata for a config-keyed registration.
    ///
    /// Package and version are left empty; plugins fill them in with
    /// [`DiscoveryMetadata::with_package`].
    pub fn for_config(
        component_type: ComponentKind,
        component_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            component_type,
            component_name: component_name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// Metadata for a tool wrapper, named after its framework.
    #[must_use]
    pub fn for_tool_wrapper(framework: &Framework) -> Self {
        Self::for_config(ComponentKind::ToolWrapper, framework.as_str(), "")
    }

    /// Metadata for an installed package.
    pub fn for_package(package: impl Into<String>, version: impl Into<String>) -> Self {
        let package = package.into();
        Self {
            component_name: package.clone(),
            package,
            version: version.into(),
            component_type: ComponentKind::Package,
            ..Self::default()
        }
    }

    /// Metadata recording a failed collection.
    #[must_use]
    pub fn failure() -> Self {
        Self {
            status: DiscoveryStatus::Failure,
            ..Self::default()
        }
    }

    /// Override the package and version the component comes from.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>, version: impl Into<String>) -> Self {
        self.package = package.into();
        self.version = version.into();
        self
    }

    /// Attach developer notes.
    #[must_use]
    pub fn with_developer_notes(mut self, notes: impl Into<String>) -> Self {
        self.developer_notes = notes.into();
        self
    }
}
