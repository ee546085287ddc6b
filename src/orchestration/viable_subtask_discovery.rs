//! # Viable Subtask Discovery
//!
//! Readiness rules over a locked [`TaskInstance`].
//!
//! Going forward, a PENDING subtask becomes eligible once every upstream is
//! SUCCESSFUL. Under rollback the graph is walked against its edges: a
//! SUCCESSFUL subtask that has not been rolled back becomes eligible once every
//! downstream is either PENDING (never ran) or already rolled back.
//!
//! No subtask of a task with a FAILED subtask is ever promoted or dispatched;
//! the task halts until an operator (or the automatic retry budget) resolves
//! the failure.

use crate::models::{SubtaskInstance, SubtaskOperation, SubtaskState, TaskInstance, TaskState};
use crate::state_machine::{SubtaskEvent, SubtaskStateMachine};
use tracing::{debug, warn};

/// Whether `subtask`'s neighbours allow it to be dispatched in the task's
/// current direction
pub fn dependencies_satisfied(task: &TaskInstance, subtask: &SubtaskInstance) -> bool {
    if task.is_rolling_back() {
        subtask.downstreams.iter().all(|id| {
            task.subtask(*id)
                .is_some_and(|d| d.state == SubtaskState::Pending || d.is_rolled_back())
        })
    } else {
        subtask.upstreams.iter().all(|id| {
            task.subtask(*id)
                .is_some_and(|u| u.state == SubtaskState::Successful)
        })
    }
}

/// Subtasks that could move to READY right now, ignoring the concurrency ceiling
pub fn find_viable_subtasks(task: &TaskInstance) -> Vec<i64> {
    if task.state != TaskState::Running || task.has_failed_subtask() {
        return Vec::new();
    }

    let rolling_back = task.is_rolling_back();
    task.subtasks
        .iter()
        .filter(|s| {
            if rolling_back {
                s.state == SubtaskState::Successful && !s.is_rolled_back()
            } else {
                s.state == SubtaskState::Pending
            }
        })
        .filter(|s| dependencies_satisfied(task, s))
        .map(|s| s.subtask_id)
        .collect()
}

/// Move viable subtasks to READY while READY + RUNNING + CANCELING stays
/// within `ceiling`. Returns the promoted ids.
pub fn promote_viable_subtasks(task: &mut TaskInstance, ceiling: usize) -> Vec<i64> {
    let viable = find_viable_subtasks(task);
    if viable.is_empty() {
        return viable;
    }

    let budget = ceiling.saturating_sub(task.in_flight_count());
    let operation = if task.is_rolling_back() {
        SubtaskOperation::Rollback
    } else {
        SubtaskOperation::Execute
    };

    let mut promoted = Vec::with_capacity(budget.min(viable.len()));
    for subtask_id in viable.into_iter().take(budget) {
        let Some(subtask) = task.subtask_mut(subtask_id) else {
            continue;
        };
        match SubtaskStateMachine::transition(subtask, SubtaskEvent::enqueue(operation)) {
            Ok(_) => promoted.push(subtask_id),
            Err(e) => warn!(
                task_id = subtask.task_id,
                subtask_id,
                error = %e,
                "Failed to promote viable subtask"
            ),
        }
    }

    if !promoted.is_empty() {
        debug!(
            task_id = task.task_id,
            operation = %operation,
            promoted = ?promoted,
            "Promoted viable subtasks"
        );
    }

    promoted
}
