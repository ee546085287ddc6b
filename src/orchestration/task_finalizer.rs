//! # Task Finalizer
//!
//! Derives a task's state from the aggregate of its subtasks.

use crate::models::{SubtaskInstance, SubtaskOperation, SubtaskState, TaskInstance};
use crate::state_machine::{TaskEvent, TaskStateMachine};
use crate::error::Result;
use std::fmt;

/// What the subtasks of a RUNNING task say about the task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    InProgress,
    /// Every subtask resolved in the task's direction
    Succeeded,
    /// A subtask failed, nothing is executing and no automatic retry is left
    Failed,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A FAILED subtask the failed-subtask worker will re-enqueue on its own
pub fn is_auto_retryable(subtask: &SubtaskInstance) -> bool {
    subtask.state == SubtaskState::Failed
        && subtask.operation != SubtaskOperation::Cancel
        && subtask.run_count <= subtask.retry_count
}

pub struct TaskFinalizer;

impl TaskFinalizer {
    pub fn evaluate(task: &TaskInstance) -> TaskOutcome {
        // Operator-queued work is dispatched even next to a failed sibling
        let manual_queued = task
            .subtasks
            .iter()
            .any(|s| s.state == SubtaskState::Ready && s.manual);
        if task.executing_count() > 0 || manual_queued {
            return TaskOutcome::InProgress;
        }

        let mut failed = task.subtasks_in_state(SubtaskState::Failed).peekable();
        if failed.peek().is_some() {
            return if failed.any(is_auto_retryable) {
                TaskOutcome::InProgress
            } else {
                TaskOutcome::Failed
            };
        }

        let resolved = if task.is_rolling_back() {
            task.subtasks
                .iter()
                .all(|s| s.state == SubtaskState::Pending || s.is_rolled_back())
        } else {
            task.subtasks
                .iter()
                .all(|s| s.state == SubtaskState::Successful)
        };

        if resolved {
            TaskOutcome::Succeeded
        } else {
            TaskOutcome::InProgress
        }
    }

    /// Move a RUNNING task to its terminal state if its subtasks allow it.
    /// Returns the outcome that was applied.
    pub fn finalize(task: &mut TaskInstance) -> Result<TaskOutcome> {
        let outcome = Self::evaluate(task);
        match outcome {
            TaskOutcome::Succeeded => {
                TaskStateMachine::transition(task, TaskEvent::Complete)?;
            }
            TaskOutcome::Failed => {
                TaskStateMachine::transition(task, TaskEvent::Fail)?;
            }
            TaskOutcome::InProgress => {}
        }
        Ok(outcome)
    }
}
