use super::{NewSubtaskInstance, SubtaskInstance, SubtaskState, TaskOperation, TaskState};
use crate::context::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Runtime record of a submitted task together with all of its subtasks.
///
/// `subtasks` is sorted by `subtask_id`, which is also materialization order,
/// so two snapshots of an unchanged task serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub task_id: i64,
    pub task_type: String,
    /// Name of the template the task was materialized from
    pub name: String,
    pub state: TaskState,
    pub operation: TaskOperation,
    pub creator: String,
    pub context: Context,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub subtasks: Vec<SubtaskInstance>,
}

impl TaskInstance {
    pub fn subtask(&self, subtask_id: i64) -> Option<&SubtaskInstance> {
        self.subtasks
            .binary_search_by_key(&subtask_id, |s| s.subtask_id)
            .ok()
            .map(|idx| &self.subtasks[idx])
    }

    pub fn subtask_mut(&mut self, subtask_id: i64) -> Option<&mut SubtaskInstance> {
        self.subtasks
            .binary_search_by_key(&subtask_id, |s| s.subtask_id)
            .ok()
            .map(move |idx| &mut self.subtasks[idx])
    }

    pub fn is_rolling_back(&self) -> bool {
        self.operation.is_rollback()
    }

    pub fn subtasks_in_state(&self, state: SubtaskState) -> impl Iterator<Item = &SubtaskInstance> {
        self.subtasks.iter().filter(move |s| s.state == state)
    }

    /// READY, RUNNING and CANCELING subtasks; bounded by the task concurrency ceiling
    pub fn in_flight_count(&self) -> usize {
        self.subtasks.iter().filter(|s| s.state.is_in_flight()).count()
    }

    /// RUNNING and CANCELING subtasks, i.e. those with a live invocation
    pub fn executing_count(&self) -> usize {
        self.subtasks.iter().filter(|s| s.state.is_executing()).count()
    }

    pub fn has_failed_subtask(&self) -> bool {
        self.subtasks.iter().any(|s| s.state == SubtaskState::Failed)
    }
}

/// Task to be created by [`TaskStore::create_task`](crate::persistence::TaskStore::create_task)
#[derive(Debug, Clone, PartialEq)]
pub struct NewTaskInstance {
    pub task_type: String,
    pub name: String,
    pub creator: String,
    pub context: Context,
    pub subtasks: Vec<NewSubtaskInstance>,
}
