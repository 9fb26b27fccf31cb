//! Per-run context state.
//!
//! A [`Context`] is an immutable, cheaply clonable snapshot of everything a
//! running function needs: the input message, the user identity, the event
//! stream of the run, the active invocation node and the user input callback.
//! It is passed explicitly to every function invocation. Deriving a child
//! context never affects concurrent siblings, while children inherit the
//! parent's values at the point they are created.

pub mod stream;
pub mod steps;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    any::Any,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};
use uuid::Uuid;

use crate::{
    error::PlexusError,
    types::{
        IntermediateStepPayload, IntermediateStepType, InvocationNode, StreamEventData,
    },
    Result,
};

pub use steps::IntermediateStepManager;
pub use stream::{EventStream, Notification, NotificationStream, Observer, Subject, Subscription};

use steps::StepTracker;

/// A question the workflow asks the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionPrompt {
    /// Prompt id
    pub id: String,
    /// Text shown to the user
    pub text: String,
    /// When the prompt was created
    pub timestamp: DateTime<Utc>,
}

impl InteractionPrompt {
    /// Create a prompt with a fresh id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The user's answer to an [`InteractionPrompt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanResponse {
    /// Answer text
    pub text: String,
}

/// Callback asking the user for input.
pub type UserInputCallback =
    Arc<dyn Fn(InteractionPrompt) -> BoxFuture<'static, Result<HumanResponse>> + Send + Sync>;

/// Opaque user identity holder installed by a session.
pub type UserManager = Arc<dyn Any + Send + Sync>;

/// The currently open step of one logical thread of control.
#[derive(Debug, Clone, Default)]
pub(crate) struct StepLane {
    current: Arc<Mutex<Option<String>>>,
}

impl StepLane {
    fn seeded(value: Option<String>) -> Self {
        Self {
            current: Arc::new(Mutex::new(value)),
        }
    }

    pub(crate) fn current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set(&self, value: Option<String>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

#[derive(Clone)]
struct ContextState {
    input_message: Option<Value>,
    user_manager: Option<UserManager>,
    event_stream: EventStream,
    steps: Arc<StepTracker>,
    active_function: InvocationNode,
    user_input_callback: Option<UserInputCallback>,
    lane: StepLane,
}

/// Explicitly propagated run context.
#[derive(Clone)]
pub struct Context {
    state: Arc<ContextState>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("input_message", &self.state.input_message)
            .field("active_function", &self.state.active_function)
            .field("has_user_manager", &self.state.user_manager.is_some())
            .field("has_user_input_callback", &self.state.user_input_callback.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a root context with a fresh event stream.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(ContextState {
                input_message: None,
                user_manager: None,
                event_stream: EventStream::new(),
                steps: Arc::new(StepTracker::default()),
                active_function: InvocationNode::root(),
                user_input_callback: None,
                lane: StepLane::default(),
            }),
        }
    }

    fn derive(&self, update: impl FnOnce(&mut ContextState)) -> Self {
        let mut state = (*self.state).clone();
        update(&mut state);
        Self {
            state: Arc::new(state),
        }
    }

    /// Input message of the current run.
    #[must_use]
    pub fn input_message(&self) -> Option<&Value> {
        self.state.input_message.as_ref()
    }

    /// User identity holder of the current session, downcast to `T`.
    #[must_use]
    pub fn user_manager<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.state
            .user_manager
            .as_ref()
            .and_then(|manager| Arc::clone(manager).downcast::<T>().ok())
    }

    /// Event stream of the current run.
    #[must_use]
    pub fn event_stream(&self) -> &EventStream {
        &self.state.event_stream
    }

    /// The function currently being executed.
    #[must_use]
    pub fn active_function(&self) -> &InvocationNode {
        &self.state.active_function
    }

    /// Step manager publishing on this context's event stream.
    #[must_use]
    pub fn intermediate_step_manager(&self) -> IntermediateStepManager {
        IntermediateStepManager::new(self.clone())
    }

    pub(crate) fn step_lane(&self) -> &StepLane {
        &self.state.lane
    }

    pub(crate) fn step_tracker(&self) -> &StepTracker {
        &self.state.steps
    }

    /// Ask the user for input through the session's callback.
    pub async fn user_input(&self, prompt: InteractionPrompt) -> Result<HumanResponse> {
        let callback = self.state.user_input_callback.as_ref().ok_or_else(|| {
            PlexusError::configuration("No user input callback is set for this session")
        })?;
        callback(prompt).await
    }

    /// Derive a context bound to `input_message`.
    #[must_use]
    pub fn with_input_message(&self, input_message: Value) -> Self {
        self.derive(|state| state.input_message = Some(input_message))
    }

    /// Derive a context with a different user identity holder.
    #[must_use]
    pub fn with_user_manager(&self, user_manager: Option<UserManager>) -> Self {
        self.derive(|state| state.user_manager = user_manager)
    }

    /// Derive a context with a different user input callback.
    #[must_use]
    pub fn with_user_input_callback(&self, callback: Option<UserInputCallback>) -> Self {
        self.derive(|state| state.user_input_callback = callback)
    }

    /// Derive a context for a new run: fresh event stream and step tracking,
    /// active function reset to the root node.
    #[must_use]
    pub fn with_fresh_run(&self) -> Self {
        self.derive(|state| {
            state.event_stream = EventStream::new();
            state.steps = Arc::new(StepTracker::default());
            state.active_function = InvocationNode::root();
            state.lane = StepLane::default();
        })
    }

    /// Enter a function invocation.
    ///
    /// Publishes FUNCTION_START immediately. The returned guard carries the
    /// child context in which the function body must run and publishes
    /// FUNCTION_END when dropped, on every exit path.
    #[must_use = "FUNCTION_END is published when the guard is dropped"]
    pub fn push_active_function(
        &self,
        function_name: impl Into<String>,
        input: Option<Value>,
    ) -> ActiveFunctionGuard {
        let function_name = function_name.into();
        let node = self.state.active_function.child(function_name.clone());
        let function_id = node.function_id.clone();
        let lane = StepLane::seeded(self.state.lane.current());
        let child = self.derive(|state| {
            state.active_function = node;
            state.lane = lane;
        });

        child.intermediate_step_manager().push_intermediate_step(
            IntermediateStepPayload::new(IntermediateStepType::FunctionStart)
                .with_uuid(function_id.clone())
                .with_name(function_name.clone())
                .with_data(StreamEventData {
                    input: input.clone(),
                    ..StreamEventData::default()
                }),
        );

        ActiveFunctionGuard {
            context: child,
            function_id,
            function_name,
            input,
            output: None,
        }
    }
}

/// Scope of one function invocation, see [`Context::push_active_function`].
#[derive(Debug)]
pub struct ActiveFunctionGuard {
    context: Context,
    function_id: String,
    function_name: String,
    input: Option<Value>,
    output: Option<Value>,
}

impl ActiveFunctionGuard {
    /// Context in which the function body runs.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Record the output published with FUNCTION_END.
    pub fn set_output(&mut self, output: Value) {
        self.output = Some(output);
    }

    /// Output recorded so far.
    #[must_use]
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }
}

impl Drop for ActiveFunctionGuard {
    fn drop(&mut self) {
        self.context.intermediate_step_manager().push_intermediate_step(
            IntermediateStepPayload::new(IntermediateStepType::FunctionEnd)
                .with_uuid(self.function_id.clone())
                .with_name(self.function_name.clone())
                .with_data(StreamEventData {
                    input: self.input.take(),
                    output: self.output.take(),
                    chunk: None,
                }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntermediateStepType;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_push_active_function_publishes_start_and_end() {
        let context = Context::new().with_fresh_run();
        let stream = context.event_stream().subscribe_stream();

        {
            let mut guard = context.push_active_function("outer", Some(json!("in")));
            assert_eq!(guard.context().active_function().function_name, "outer");
            assert_eq!(guard.context().active_function().parent_id.as_deref(), Some("root"));
            guard.set_output(json!("out"));
        }
        assert_eq!(context.active_function().function_name, "root");
        context.event_stream().on_complete();

        let (steps, _) = stream.collect_items().await;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].event_type(), IntermediateStepType::FunctionStart);
        assert_eq!(steps[1].event_type(), IntermediateStepType::FunctionEnd);
        assert_eq!(steps[0].uuid(), steps[1].uuid());
        assert_eq!(steps[1].data().unwrap().output, Some(json!("out")));
        assert_eq!(steps[1].function_ancestry.function_name, "outer");
    }

    #[tokio::test]
    async fn test_function_end_published_on_error_path() {
        async fn failing(context: &Context) -> Result<Value> {
            let _guard = context.push_active_function("failing", None);
            Err(PlexusError::internal("boom"))
        }

        let context = Context::new();
        let stream = context.event_stream().subscribe_stream();
        assert!(failing(&context).await.is_err());
        context.event_stream().on_complete();

        let (steps, _) = stream.collect_items().await;
        let types: Vec<_> = steps.iter().map(|s| s.event_type()).collect();
        assert_eq!(
            types,
            vec![IntermediateStepType::FunctionStart, IntermediateStepType::FunctionEnd]
        );
    }

    #[tokio::test]
    async fn test_siblings_do_not_share_active_function() {
        let context = Context::new();
        let left = context.push_active_function("left", None);
        let right = context.push_active_function("right", None);
        assert_eq!(left.context().active_function().function_name, "left");
        assert_eq!(right.context().active_function().function_name, "right");
        assert_eq!(
            left.context().active_function().parent_id,
            right.context().active_function().parent_id
        );
    }

    #[tokio::test]
    async fn test_user_input_requires_callback() {
        let context = Context::new();
        assert!(context.user_input(InteractionPrompt::new("name?")).await.is_err());

        let callback: UserInputCallback = Arc::new(|prompt: InteractionPrompt| {
            async move {
                Ok(HumanResponse {
                    text: format!("answer to {}", prompt.text),
                })
            }
            .boxed()
        });
        let context = context.with_user_input_callback(Some(callback));
        let response = context.user_input(InteractionPrompt::new("name?")).await.unwrap();
        assert_eq!(response.text, "answer to name?");
    }

    #[test]
    fn test_user_manager_downcast() {
        let context = Context::new().with_user_manager(Some(Arc::new("alice".to_string())));
        assert_eq!(context.user_manager::<String>().as_deref().map(String::as_str), Some("alice"));
        assert!(context.user_manager::<u32>().is_none());
    }
}
