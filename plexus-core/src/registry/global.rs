//! Process-wide registry instance.

use once_cell::sync::Lazy;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use super::TypeRegistry;

static REGISTRY: Lazy<RwLock<Arc<TypeRegistry>>> =
    Lazy::new(|| RwLock::new(Arc::new(TypeRegistry::new())));

/// Accessor for the process-wide [`TypeRegistry`].
///
/// Readers get a cheap snapshot; writers clone-on-write so snapshots held by
/// running builders never observe a half-applied plugin load.
pub struct GlobalTypeRegistry;

impl GlobalTypeRegistry {
    /// Snapshot of the current registry.
    #[must_use]
    pub fn get() -> Arc<TypeRegistry> {
        Arc::clone(&REGISTRY.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Mutate a copy of the registry and install it.
    ///
    /// Change hooks are held back while `f` runs and fire once after the new
    /// registry is installed and the lock is released, so a hook may read
    /// the global registry.
    pub fn update<R>(f: impl FnOnce(&mut TypeRegistry) -> R) -> R {
        let mut guard = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = TypeRegistry::clone(&guard);
        next.hooks_paused += 1;
        let result = f(&mut next);
        next.hooks_paused -= 1;

        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        drop(guard);
        next.registration_changed();
        result
    }

    /// Install a copy of the current registry until the returned guard drops.
    ///
    /// Registrations made while the guard lives are discarded on drop; tests
    /// use this to keep plugin registrations from leaking between cases.
    #[must_use]
    pub fn push() -> RegistryOverride {
        let mut guard = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
        let saved = Arc::clone(&guard);
        *guard = Arc::new(TypeRegistry::clone(&saved));
        debug!("Pushed a scoped type registry");
        RegistryOverride { saved: Some(saved) }
    }
}

/// Restores the previous global registry when dropped.
#[must_use = "the override is reverted as soon as it is dropped"]
pub struct RegistryOverride {
    saved: Option<Arc<TypeRegistry>>,
}

impl Drop for RegistryOverride {
    fn drop(&mut self) {
        let Some(saved) = self.saved.take() else {
            return;
        };
        {
            let mut guard = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
            *guard = Arc::clone(&saved);
        }
        debug!("Restored the previous type registry");
        saved.registration_changed();
    }
}
