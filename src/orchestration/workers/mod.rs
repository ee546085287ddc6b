//! # Polling Workers
//!
//! The TaskCoordinator runs [`ReadyTaskWorker`] and [`RunningTaskWorker`];
//! the SubtaskCoordinator runs the four subtask workers. Every worker scans
//! the store for instances in one state, then re-reads each candidate under
//! its task lock before changing anything, since the snapshot may be stale by
//! the time the lock is granted.

mod canceling_subtask;
mod failed_subtask;
mod ready_subtask;
mod ready_task;
mod running_subtask;
mod running_task;

pub use canceling_subtask::CancelingSubtaskWorker;
pub use failed_subtask::FailedSubtaskWorker;
pub use ready_subtask::ReadySubtaskWorker;
pub use ready_task::ReadyTaskWorker;
pub use running_subtask::RunningSubtaskWorker;
pub use running_task::RunningTaskWorker;

use super::core::OrchestrationCore;
use crate::error::Result;
use crate::logging::log_subtask_operation;
use crate::models::TaskInstance;
use crate::persistence::TaskLock;
use crate::state_machine::{SubtaskEvent, SubtaskStateMachine};

/// Fail `subtask_id` inside `lock`, commit, and run the subtask hooks
pub(crate) async fn fail_subtask(
    core: &OrchestrationCore,
    mut lock: Box<dyn TaskLock>,
    subtask_id: i64,
    worker: &str,
    message: String,
) -> Result<TaskInstance> {
    let subtask = lock
        .task_mut()
        .subtask_mut(subtask_id)
        .ok_or(crate::error::TaskEngineError::SubtaskNotFound(subtask_id))?;
    SubtaskStateMachine::transition(subtask, SubtaskEvent::Fail(message.clone()))?;

    let task = lock.commit().await?;
    if let Some(subtask) = task.subtask(subtask_id) {
        log_subtask_operation(worker, task.task_id, subtask_id, &subtask.name, "FAILED", Some(&message));
        core.hooks.run_subtask_hooks(subtask);
    }
    Ok(task)
}
