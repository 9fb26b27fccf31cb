//! Intermediate step publication.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use tracing::{debug, warn};

use crate::{
    context::{Context, stream::Observer, stream::Subscription},
    types::{
        IntermediateStep, IntermediateStepPayload, IntermediateStepState, IntermediateStepType,
        InvocationNode,
    },
};

#[derive(Debug, Clone)]
struct OpenStep {
    step_name: Option<String>,
    step_type: IntermediateStepType,
    step_parent_id: Option<String>,
}

/// Steps that received a START but no END yet, shared by one run.
#[derive(Debug, Default)]
pub(crate) struct StepTracker {
    outstanding: Mutex<HashMap<String, OpenStep>>,
}

impl StepTracker {
    fn open(&self, id: String, step: OpenStep) {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, step);
    }

    fn close(&self, id: &str) -> Option<OpenStep> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn get(&self, id: &str) -> Option<OpenStep> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub(crate) fn outstanding_count(&self) -> usize {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Publishes intermediate steps on the event stream of a [`Context`].
///
/// Every published step is stamped with the ancestry of the function active
/// in the context, while the step parent (the step that was open on the same
/// lane when a START arrived) is tracked separately and recorded as the
/// ancestry's `parent_id`.
#[derive(Debug, Clone)]
pub struct IntermediateStepManager {
    context: Context,
}

impl IntermediateStepManager {
    pub(crate) fn new(context: Context) -> Self {
        Self { context }
    }

    /// Push a payload onto the event stream.
    ///
    /// CHUNK and END payloads without a matching START are dropped with a
    /// warning, as are payloads that violate their own invariants. This never
    /// fails so that eventing cannot abort a run.
    pub fn push_intermediate_step(&self, payload: IntermediateStepPayload) {
        if let Err(e) = payload.validate() {
            warn!("Dropping invalid intermediate step {}: {}", payload.uuid, e);
            return;
        }

        let lane = self.context.step_lane();
        let tracker = self.context.step_tracker();
        let mut parent_step_id = lane.current();

        match payload.event_state() {
            IntermediateStepState::Start => {
                lane.set(Some(payload.uuid.clone()));
                tracker.open(
                    payload.uuid.clone(),
                    OpenStep {
                        step_name: payload.name.clone(),
                        step_type: payload.event_type,
                        step_parent_id: parent_step_id.clone(),
                    },
                );
            }
            IntermediateStepState::End => {
                let Some(open_step) = tracker.close(&payload.uuid) else {
                    warn!("Step id {} not found in outstanding start steps", payload.uuid);
                    return;
                };
                debug!(
                    "Closing {} step {}",
                    open_step.step_type,
                    open_step.step_name.as_deref().unwrap_or(&payload.uuid)
                );
                if parent_step_id.as_deref() == Some(payload.uuid.as_str()) {
                    lane.set(open_step.step_parent_id);
                } else {
                    parent_step_id = open_step.step_parent_id;
                }
            }
            IntermediateStepState::Chunk => {
                let Some(open_step) = tracker.get(&payload.uuid) else {
                    warn!(
                        "Created a chunk for step {}, but no matching start step was found. \
                         Chunks must be created with the same ID as the start step.",
                        payload.uuid
                    );
                    return;
                };
                if parent_step_id.as_deref() != Some(payload.uuid.as_str()) {
                    parent_step_id = open_step.step_parent_id;
                }
            }
        }

        let active = self.context.active_function();
        let function_ancestry = InvocationNode {
            function_id: active.function_id.clone(),
            function_name: active.function_name.clone(),
            parent_id: parent_step_id,
            parent_name: active.parent_name.clone(),
        };

        self.context.event_stream().on_next(IntermediateStep {
            function_ancestry,
            payload,
        });
    }

    /// Subscribe to the intermediate steps of the current run.
    pub fn subscribe<O: Observer<IntermediateStep>>(&self, observer: O) -> Subscription {
        self.context.event_stream().subscribe(observer)
    }

    /// Number of steps currently open in this run.
    #[must_use]
    pub fn outstanding_steps(&self) -> usize {
        self.context.step_tracker().outstanding_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IntermediateStepType, StreamEventData};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_start_chunk_end_parentage() {
        let context = Context::new();
        let stream = context.event_stream().subscribe_stream();
        let manager = context.intermediate_step_manager();

        let start = IntermediateStepPayload::new(IntermediateStepType::LlmStart).with_name("gpt");
        let id = start.uuid.clone();
        manager.push_intermediate_step(start);
        assert_eq!(manager.outstanding_steps(), 1);

        manager.push_intermediate_step(
            IntermediateStepPayload::new(IntermediateStepType::LlmNewToken)
                .with_uuid(id.clone())
                .with_data(StreamEventData {
                    chunk: Some("tok".into()),
                    ..StreamEventData::default()
                }),
        );
        manager.push_intermediate_step(IntermediateStepPayload::new(IntermediateStepType::LlmEnd).with_uuid(id.clone()));
        context.event_stream().on_complete();

        let (steps, _) = stream.collect_items().await;
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].function_ancestry.parent_id, None);
        assert_eq!(steps[1].function_ancestry.parent_id.as_deref(), Some(id.as_str()));
        assert_eq!(steps[0].function_ancestry.function_id, "root");
        assert_eq!(manager.outstanding_steps(), 0);
    }

    #[tokio::test]
    async fn test_dangling_chunk_and_end_are_dropped() {
        let context = Context::new();
        let stream = context.event_stream().subscribe_stream();
        let manager = context.intermediate_step_manager();

        manager.push_intermediate_step(IntermediateStepPayload::new(IntermediateStepType::LlmNewToken).with_uuid("missing"));
        manager.push_intermediate_step(IntermediateStepPayload::new(IntermediateStepType::ToolEnd).with_uuid("missing"));
        context.event_stream().on_complete();

        let (steps, error) = stream.collect_items().await;
        assert!(steps.is_empty());
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_nested_start_records_step_parent() {
        let context = Context::new();
        let stream = context.event_stream().subscribe_stream();
        let manager = context.intermediate_step_manager();

        let outer = IntermediateStepPayload::new(IntermediateStepType::TaskStart);
        let outer_id = outer.uuid.clone();
        manager.push_intermediate_step(outer);
        let inner = IntermediateStepPayload::new(IntermediateStepType::ToolStart);
        let inner_id = inner.uuid.clone();
        manager.push_intermediate_step(inner);
        manager.push_intermediate_step(IntermediateStepPayload::new(IntermediateStepType::ToolEnd).with_uuid(inner_id));

        assert_eq!(context.step_lane().current(), Some(outer_id.clone()));
        context.event_stream().on_complete();

        let (steps, _) = stream.collect_items().await;
        assert_eq!(steps[1].function_ancestry.parent_id.as_deref(), Some(outer_id.as_str()));
    }
}
