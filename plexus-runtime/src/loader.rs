//! Plugin discovery and workflow loading.
//!
//! Plugins are listed in a static manifest: every crate providing components
//! exposes a [`Plugin`] whose `register` adds its registrations to a
//! [`TypeRegistry`]. [`discover_and_register_plugins`] runs the manifest
//! before any configuration is parsed.

use std::{
    fmt,
    future::Future,
    ops::{BitOr, BitOrAssign},
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use plexus_core::{PlexusError, Result, TypeRegistry, WorkflowConfig};

use crate::{builder::WorkflowBuilder, session::SessionManager};

/// Kinds of registrations a plugin provides.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PluginTypes(u8);

impl PluginTypes {
    /// No registrations
    pub const NONE: Self = Self(0);
    /// Functions, LLMs, embedders, memory, retrievers, tool wrappers
    pub const COMPONENT: Self = Self(1);
    /// Front ends
    pub const FRONT_END: Self = Self(1 << 1);
    /// Evaluators
    pub const EVALUATOR: Self = Self(1 << 2);
    /// Registry handlers
    pub const REGISTRY_HANDLER: Self = Self(1 << 3);
    /// Logging methods and telemetry exporters
    pub const TELEMETRY: Self = Self(1 << 4);
    /// Everything a workflow configuration can reference
    pub const CONFIG_OBJECT: Self = Self(Self::COMPONENT.0 | Self::FRONT_END.0 | Self::EVALUATOR.0 | Self::TELEMETRY.0);
    /// Everything
    pub const ALL: Self = Self(Self::CONFIG_OBJECT.0 | Self::REGISTRY_HANDLER.0);

    /// Whether every type of `other` is included.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any type of `other` is included.
    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for PluginTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PluginTypes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PluginTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::COMPONENT, "COMPONENT"),
            (Self::FRONT_END, "FRONT_END"),
            (Self::EVALUATOR, "EVALUATOR"),
            (Self::REGISTRY_HANDLER, "REGISTRY_HANDLER"),
            (Self::TELEMETRY, "TELEMETRY"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "PluginTypes({})", set.join(" | "))
    }
}

/// A crate providing registrations.
pub trait Plugin: Send + Sync {
    /// Package name recorded in discovery metadata.
    fn name(&self) -> &str;

    /// Package version recorded in discovery metadata.
    fn version(&self) -> &str;

    /// Kinds of registrations this plugin provides.
    fn plugin_types(&self) -> PluginTypes {
        PluginTypes::COMPONENT
    }

    /// Add this plugin's registrations.
    fn register(&self, registry: &mut TypeRegistry) -> Result<()>;
}

/// The built-in logging methods and span exporters of this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinsPlugin;

impl Plugin for BuiltinsPlugin {
    fn name(&self) -> &str {
        crate::NAME
    }

    fn version(&self) -> &str {
        crate::VERSION
    }

    fn plugin_types(&self) -> PluginTypes {
        PluginTypes::TELEMETRY
    }

    fn register(&self, registry: &mut TypeRegistry) -> Result<()> {
        crate::register_builtins(registry)
    }
}

const FIRST_PLUGIN_WARN_THRESHOLD: Duration = Duration::from_millis(300);
const PLUGIN_WARN_THRESHOLD: Duration = Duration::from_millis(100);

/// Register every plugin of `plugins` that provides any of `types`.
///
/// Change hooks are paused for the duration and fire once at the end. A
/// plugin whose registration fails is logged and skipped without leaving
/// partial registrations behind. Returns the number of plugins registered.
pub fn discover_and_register_plugins(
    registry: &mut TypeRegistry,
    plugins: &[&dyn Plugin],
    types: PluginTypes,
) -> usize {
    let mut registry = registry.pause_registration_changed_hooks();
    let mut registered = 0;
    let mut timed = 0;

    for plugin in plugins {
        if !plugin.plugin_types().intersects(types) {
            debug!(
                "Skipping plugin `{}` providing {:?}",
                plugin.name(),
                plugin.plugin_types()
            );
            continue;
        }

        let started = Instant::now();
        let mut scratch = TypeRegistry::new();
        match plugin
            .register(&mut scratch)
            .and_then(|()| registry.merge(scratch))
        {
            Ok(()) => {
                registry.register_package(plugin.name(), Some(plugin.version()));
                registered += 1;
            }
            Err(e) => {
                warn!("Failed to register plugin `{}`: {}", plugin.name(), e);
                continue;
            }
        }

        let elapsed = started.elapsed();
        let threshold = if timed == 0 {
            FIRST_PLUGIN_WARN_THRESHOLD
        } else {
            PLUGIN_WARN_THRESHOLD
        };
        timed += 1;
        if elapsed > threshold {
            warn!(
                "Loading plugin `{}` took {:?}, which exceeds {:?}; keep registration free of heavy work",
                plugin.name(),
                elapsed,
                threshold
            );
        } else {
            debug!("Loaded plugin `{}` in {:?}", plugin.name(), elapsed);
        }
    }

    info!("Registered {} plugins", registered);
    registered
}

/// Read and validate a workflow configuration file.
pub async fn load_config(path: impl AsRef<Path>, registry: &TypeRegistry) -> Result<WorkflowConfig> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    WorkflowConfig::from_file(path, registry).await
}

/// Build the workflow described by the file at `path` and hand a session
/// manager for it to `f`. The builder scope is left once `f` returns.
pub async fn load_workflow<F, Fut, R>(
    path: impl AsRef<Path>,
    registry: Arc<TypeRegistry>,
    max_concurrency: i64,
    f: F,
) -> Result<R>
where
    F: FnOnce(SessionManager) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let config = load_config(path, &registry).await?;
    WorkflowBuilder::from_config(&config, registry, |builder| async move {
        let workflow = Arc::new(builder.build()?);
        f(SessionManager::new(workflow, max_concurrency)).await
    })
    .await
}

/// Build and run the front end configured under `general.front_end`.
pub async fn start_front_end(config: Arc<WorkflowConfig>, registry: &TypeRegistry) -> Result<()> {
    let front_end_config = config.general.front_end.clone().ok_or_else(|| {
        PlexusError::configuration("No front end is configured under `general.front_end`")
    })?;
    let build_fn = registry
        .get_front_end(front_end_config.config_type())?
        .build_fn
        .clone();

    info!("Starting front end `{}`", front_end_config.config_type());
    let (front_end, teardown) = build_fn(front_end_config, config).await?.into_parts();
    let result = front_end.run().await;
    if let Some(teardown) = teardown {
        teardown().await?;
    }
    result
}
