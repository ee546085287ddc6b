use super::{
    errors::{StateMachineError, StateMachineResult},
    events::TaskEvent,
    states::TaskState,
};
use crate::models::TaskInstance;
use chrono::Utc;
use tracing::debug;

/// Transition table for task instances
pub struct TaskStateMachine;

impl TaskStateMachine {
    pub fn determine_target_state(
        current: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskState> {
        let target = match (current, event) {
            (TaskState::Running, TaskEvent::Complete) => TaskState::Successful,
            (TaskState::Running, TaskEvent::Fail) => TaskState::Failed,
            (TaskState::Failed, TaskEvent::Resume(_)) => TaskState::Running,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    pub fn transition(task: &mut TaskInstance, event: TaskEvent) -> StateMachineResult<TaskState> {
        let from = task.state;
        let target = Self::determine_target_state(from, &event)?;
        let now = Utc::now();

        match event {
            TaskEvent::Resume(operation) => {
                task.operation = operation;
                task.finished_at = None;
            }
            TaskEvent::Complete | TaskEvent::Fail => {
                task.finished_at = Some(now);
            }
        }

        task.state = target;
        task.updated_at = now;

        debug!(
            task_id = task.task_id,
            from = %from,
            to = %target,
            operation = %task.operation,
            "Task transition"
        );

        Ok(target)
    }
}
