//! Two-phase build results.

use futures::{FutureExt, future::BoxFuture};
use std::{fmt, future::Future};

use crate::Result;

/// Release step of a built component, run when the owning builder exits.
pub type Teardown = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// An instance yielded by a component build, plus how to release it.
///
/// The workflow builder keeps every teardown on a stack and runs them in
/// reverse acquisition order when it exits.
///
/// # Examples
///
/// ```rust
/// use plexus_core::traits::Built;
///
/// let built = Built::new(42_u32).with_teardown(|| async {
///     // close connections
///     Ok(())
/// });
/// let (instance, teardown) = built.into_parts();
/// assert_eq!(instance, 42);
/// assert!(teardown.is_some());
/// ```
pub struct Built<T> {
    /// The built instance
    pub instance: T,
    teardown: Option<Teardown>,
}

impl<T: fmt::Debug> fmt::Debug for Built<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Built")
            .field("instance", &self.instance)
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}

impl<T> Built<T> {
    /// An instance with nothing to release.
    pub fn new(instance: T) -> Self {
        Self {
            instance,
            teardown: None,
        }
    }

    /// Attach the release step.
    #[must_use]
    pub fn with_teardown<F, Fut>(mut self, teardown: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.teardown = Some(Box::new(move || teardown().boxed()));
        self
    }

    /// Transform the instance, keeping the release step.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Built<U> {
        Built {
            instance: f(self.instance),
            teardown: self.teardown,
        }
    }

    /// Split into the instance and its release step.
    pub fn into_parts(self) -> (T, Option<Teardown>) {
        (self.instance, self.teardown)
    }
}
