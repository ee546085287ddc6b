use super::{
    errors::{StateMachineError, StateMachineResult},
    events::SubtaskEvent,
    states::{SubtaskOperation, SubtaskState},
};
use crate::models::SubtaskInstance;
use chrono::Utc;
use tracing::debug;

/// Transition table for subtask instances.
///
/// The machine is pure: it validates the move, updates the in-memory record
/// and leaves persisting it to the caller's [`TaskLock`](crate::persistence::TaskLock).
pub struct SubtaskStateMachine;

impl SubtaskStateMachine {
    /// Target state for `event`, or an error if the event is illegal in `current`
    pub fn determine_target_state(
        current: SubtaskState,
        event: &SubtaskEvent,
    ) -> StateMachineResult<SubtaskState> {
        let target = match (current, event) {
            // Enqueue: first dispatch, retry/skip after failure, rollback after success
            (SubtaskState::Pending, SubtaskEvent::Enqueue { .. }) => SubtaskState::Ready,
            (SubtaskState::Failed, SubtaskEvent::Enqueue { .. }) => SubtaskState::Ready,
            (SubtaskState::Successful, SubtaskEvent::Enqueue { operation, .. })
                if operation.is_rollback() =>
            {
                SubtaskState::Ready
            }
            // Re-target a queued instance, e.g. when an operator starts a rollback
            (SubtaskState::Ready, SubtaskEvent::Enqueue { .. }) => SubtaskState::Ready,
            (SubtaskState::Ready, SubtaskEvent::Reset) => SubtaskState::Pending,

            (SubtaskState::Ready, SubtaskEvent::Start) => SubtaskState::Running,

            // Skips resolve without a dispatch
            (SubtaskState::Ready, SubtaskEvent::Complete) => SubtaskState::Successful,
            (SubtaskState::Running, SubtaskEvent::Complete) => SubtaskState::Successful,

            // Dispatch failures fail straight from READY
            (SubtaskState::Ready, SubtaskEvent::Fail(_)) => SubtaskState::Failed,
            (SubtaskState::Running, SubtaskEvent::Fail(_)) => SubtaskState::Failed,
            (SubtaskState::Canceling, SubtaskEvent::Fail(_)) => SubtaskState::Failed,

            (SubtaskState::Running, SubtaskEvent::RequestCancel) => SubtaskState::Canceling,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Apply `event` to `subtask`, updating its bookkeeping fields
    pub fn transition(
        subtask: &mut SubtaskInstance,
        event: SubtaskEvent,
    ) -> StateMachineResult<SubtaskState> {
        let from = subtask.state;
        let target = Self::determine_target_state(from, &event)?;
        let now = Utc::now();

        match event {
            SubtaskEvent::Enqueue { operation, manual } => {
                subtask.operation = operation;
                subtask.manual = manual;
            }
            SubtaskEvent::Start => {
                subtask.run_count += 1;
                subtask.started_at = Some(now);
                subtask.finished_at = None;
                subtask.error_message = None;
            }
            SubtaskEvent::Complete => {
                subtask.finished_at = Some(now);
                subtask.error_message = None;
            }
            SubtaskEvent::Fail(message) => {
                subtask.finished_at = Some(now);
                subtask.error_message = Some(message);
            }
            SubtaskEvent::RequestCancel => {
                subtask.operation = SubtaskOperation::Cancel;
            }
            SubtaskEvent::Reset => {
                subtask.operation = SubtaskOperation::Execute;
                subtask.manual = false;
            }
        }

        subtask.state = target;
        subtask.updated_at = now;

        debug!(
            subtask_id = subtask.subtask_id,
            task_id = subtask.task_id,
            from = %from,
            to = %target,
            operation = %subtask.operation,
            "Subtask transition"
        );

        Ok(target)
    }
}
