//! Admission control over concurrent runs.

use serde::{Serialize, de::DeserializeOwned};
use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use plexus_core::{
    Context, PlexusError, Result,
    context::{UserInputCallback, UserManager},
};

use crate::{runner::Runner, workflow::Workflow};

/// Hands out runs of one workflow, never more than `max_concurrency` at a
/// time.
///
/// A `max_concurrency` of zero or less disables the limit. Clones and
/// [sessions](SessionManager::session) share the same limit.
#[derive(Debug, Clone)]
pub struct SessionManager {
    workflow: Arc<Workflow>,
    semaphore: Option<Arc<Semaphore>>,
    max_concurrency: i64,
    context: Context,
}

impl SessionManager {
    /// Create a session manager for `workflow`.
    pub fn new(workflow: Arc<Workflow>, max_concurrency: i64) -> Self {
        let semaphore = usize::try_from(max_concurrency)
            .ok()
            .filter(|permits| *permits > 0)
            .map(|permits| Arc::new(Semaphore::new(permits)));
        let context = workflow.context().clone();
        Self {
            workflow,
            semaphore,
            max_concurrency,
            context,
        }
    }

    /// The managed workflow.
    #[must_use]
    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    /// Configured limit; zero or less means unlimited.
    #[must_use]
    pub fn max_concurrency(&self) -> i64 {
        self.max_concurrency
    }

    /// Context snapshot every run of this manager starts from.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// A manager whose runs see `user_manager` and `user_input_callback`,
    /// e.g. for the lifetime of one client connection.
    #[must_use]
    pub fn session(
        &self,
        user_manager: Option<UserManager>,
        user_input_callback: Option<UserInputCallback>,
    ) -> Self {
        Self {
            context: self
                .context
                .with_user_manager(user_manager)
                .with_user_input_callback(user_input_callback),
            ..self.clone()
        }
    }

    /// Wait for a free slot and start an entered run for `message`.
    ///
    /// The slot is held until the returned [`SessionRun`] is dropped.
    pub async fn run<M: Serialize>(&self, message: M) -> Result<SessionRun> {
        let permit = match &self.semaphore {
            Some(semaphore) => Some(
                Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| PlexusError::internal(format!("Session semaphore closed: {e}")))?,
            ),
            None => None,
        };
        let runner = self.workflow.run_with_context(&self.context, message)?;
        Ok(SessionRun {
            runner,
            _permit: permit,
        })
    }

    /// Run `message` to completion inside a slot and convert the output.
    pub async fn result_as<T, M>(&self, message: M) -> Result<T>
    where
        T: DeserializeOwned + 'static,
        M: Serialize,
    {
        let mut run = self.run(message).await?;
        let output = run.result_as::<T>().await?;
        run.exit()?;
        Ok(output)
    }
}

/// A [`Runner`] holding one admission slot.
#[derive(Debug)]
pub struct SessionRun {
    runner: Runner,
    _permit: Option<OwnedSemaphorePermit>,
}

impl SessionRun {
    /// Release the slot and return the runner.
    #[must_use]
    pub fn into_runner(self) -> Runner {
        self.runner
    }
}

impl Deref for SessionRun {
    type Target = Runner;

    fn deref(&self) -> &Self::Target {
        &self.runner
    }
}

impl DerefMut for SessionRun {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.runner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{FunctionArtifact, WorkflowConfig};
    use pretty_assertions::assert_eq;

    use crate::workflow::{WORKFLOW_FUNCTION_NAME, WorkflowComponents};

    #[derive(Debug)]
    struct User(&'static str);

    fn whoami() -> Arc<Workflow> {
        let entry = FunctionArtifact::Info(plexus_core::FunctionInfo::from_context_fn(
            |context: Context, _x: String| async move {
                let user = context
                    .user_manager::<User>()
                    .map_or("anonymous", |user| user.0);
                Ok::<_, PlexusError>(user.to_string())
            },
        ))
        .into_function(WORKFLOW_FUNCTION_NAME, None)
        .unwrap();
        Arc::new(Workflow::new(WorkflowConfig::new(), entry, WorkflowComponents::default()))
    }

    #[tokio::test]
    async fn test_session_installs_user_manager() {
        let manager = SessionManager::new(whoami(), 0);
        let anonymous: String = manager.result_as("?").await.unwrap();
        assert_eq!(anonymous, "anonymous");

        let session = manager.session(Some(Arc::new(User("ada")) as UserManager), None);
        let named: String = session.result_as("?").await.unwrap();
        assert_eq!(named, "ada");

        let again: String = manager.result_as("?").await.unwrap();
        assert_eq!(again, "anonymous");
    }

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let manager = SessionManager::new(whoami(), 1);
        let first = manager.run("a").await.unwrap();
        drop(first);
        let second = tokio::time::timeout(std::time::Duration::from_secs(1), manager.run("b")).await;
        assert!(second.is_ok());
    }

    #[test]
    fn test_non_positive_limit_is_unbounded() {
        assert!(SessionManager::new(whoami(), 0).semaphore.is_none());
        assert!(SessionManager::new(whoami(), -3).semaphore.is_none());
        assert!(SessionManager::new(whoami(), 2).semaphore.is_some());
    }
}
