use super::{SubtaskOperation, SubtaskState};
use crate::context::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime record of one materialized subtask.
///
/// `upstreams` and `downstreams` hold sibling `subtask_id`s of the same task,
/// sorted ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskInstance {
    pub subtask_id: i64,
    pub task_id: i64,
    pub name: String,
    /// Registry key of the implementation
    pub kind: String,
    pub state: SubtaskState,
    pub operation: SubtaskOperation,
    /// Dispatches so far, counting every operation
    pub run_count: u32,
    pub retry_count: u32,
    pub timeout_seconds: u64,
    pub prohibit_rollback: bool,
    pub split_key: Option<String>,
    pub split_value: Option<String>,
    /// Enqueued by an operator; dispatched on the manual pool
    pub manual: bool,
    pub error_message: Option<String>,
    pub upstreams: Vec<i64>,
    pub downstreams: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SubtaskInstance {
    /// SUCCESSFUL after a rollback (or rollback skip) dispatch
    pub fn is_rolled_back(&self) -> bool {
        self.state == SubtaskState::Successful && self.operation.is_rollback()
    }

    pub fn has_run(&self) -> bool {
        self.run_count > 0
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// The context handed to an invocation: the task context plus, for split
    /// instances, this instance's element under the split key.
    pub fn invocation_context(&self, task_context: &Context) -> Context {
        let mut context = task_context.clone();
        if let (Some(key), Some(value)) = (&self.split_key, &self.split_value) {
            context.put(key.clone(), value.clone());
        }
        context
    }
}

/// Subtask row to be created along with its task.
///
/// `upstreams` are positions in [`NewTaskInstance::subtasks`](super::NewTaskInstance)
/// and must point at earlier entries; the store translates them into ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubtaskInstance {
    pub name: String,
    pub kind: String,
    pub timeout_seconds: u64,
    pub retry_count: u32,
    pub prohibit_rollback: bool,
    pub split_key: Option<String>,
    pub split_value: Option<String>,
    pub upstreams: Vec<usize>,
}
