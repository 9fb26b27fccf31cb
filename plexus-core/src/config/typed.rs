//! Typed component configurations.
//!
//! Every component is described by a configuration type implementing
//! [`TypedConfig`]. The registry keys registrations by that type, and the
//! declarative workflow document selects one through its `_type` tag.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{Result, types::ComponentRef};

/// Key under which a declarative config entry names its type.
pub const TYPE_TAG: &str = "_type";

/// A component configuration type.
///
/// # Examples
///
/// ```rust
/// use plexus_core::config::TypedConfig;
/// use plexus_core::types::{ComponentRef, LlmRef};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct ChatConfig {
///     llm_name: LlmRef,
/// }
///
/// impl TypedConfig for ChatConfig {
///     const TYPE_NAME: &'static str = "chat";
///
///     fn component_refs(&self) -> Vec<ComponentRef> {
///         vec![self.llm_name.component_ref()]
///     }
/// }
/// ```
pub trait TypedConfig: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// Short name used as the `_type` tag.
    const TYPE_NAME: &'static str;

    /// Human readable description, surfaced through discovery metadata.
    const DESCRIPTION: &'static str = "";

    /// Other named components this configuration depends on.
    fn component_refs(&self) -> Vec<ComponentRef> {
        Vec::new()
    }
}

/// Runtime identity of a [`TypedConfig`] type.
#[derive(Clone, Copy)]
pub struct ConfigType {
    type_id: TypeId,
    local_name: &'static str,
    module: &'static str,
    description: &'static str,
}

impl ConfigType {
    /// Identity of `C`.
    #[must_use]
    pub fn of<C: TypedConfig>() -> Self {
        let rust_name = std::any::type_name::<C>();
        let module = rust_name.rsplit_once("::").map_or("", |(module, _)| module);
        Self {
            type_id: TypeId::of::<C>(),
            local_name: C::TYPE_NAME,
            module,
            description: C::DESCRIPTION,
        }
    }

    /// Short name of the type.
    #[must_use]
    pub fn local_name(&self) -> &'static str {
        self.local_name
    }

    /// Module the type is declared in.
    #[must_use]
    pub fn module(&self) -> &'static str {
        self.module
    }

    /// Description of the type.
    #[must_use]
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Fully qualified name, `<module>/<local_name>`.
    #[must_use]
    pub fn full_type(&self) -> String {
        format!("{}/{}", self.module, self.local_name)
    }

    /// Rust type id.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl PartialEq for ConfigType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ConfigType {}

impl Hash for ConfigType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_type())
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_type())
    }
}

/// Object safe view over any [`TypedConfig`].
pub trait AnyConfig: fmt::Debug + Send + Sync + 'static {
    /// Identity of the concrete configuration type.
    fn config_type(&self) -> ConfigType;

    /// Borrow as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Convert an `Arc` of this config into an `Arc<dyn Any>`.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Serialize the configuration, tagged with its full type name.
    ///
    /// The full name stays valid when another registration shares the short
    /// name.
    fn to_value(&self) -> Result<Value>;

    /// Named components this configuration depends on.
    fn component_refs(&self) -> Vec<ComponentRef>;
}

impl<C: TypedConfig> AnyConfig for C {
    fn config_type(&self) -> ConfigType {
        ConfigType::of::<C>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn to_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if value.is_null() {
            value = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut value {
            map.insert(TYPE_TAG.to_string(), Value::String(ConfigType::of::<C>().full_type()));
        }
        Ok(value)
    }

    fn component_refs(&self) -> Vec<ComponentRef> {
        TypedConfig::component_refs(self)
    }
}

/// Shared handle to a configuration of any type.
pub type ConfigHandle = Arc<dyn AnyConfig>;

/// Wrap a typed configuration into a [`ConfigHandle`].
pub fn config_handle<C: TypedConfig>(config: C) -> ConfigHandle {
    Arc::new(config)
}

/// Recover the typed configuration behind a handle, keeping `Arc` identity.
#[must_use]
pub fn downcast_config<C: TypedConfig>(handle: &ConfigHandle) -> Option<Arc<C>> {
    Arc::clone(handle).into_any_arc().downcast::<C>().ok()
}

/// Deserialize an untagged JSON value into a handle for `C`.
pub(crate) fn deserialize_config<C: TypedConfig>(value: Value) -> Result<ConfigHandle> {
    let config: C = serde_json::from_value(value)?;
    Ok(config_handle(config))
}
