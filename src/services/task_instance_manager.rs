use crate::error::Result;
use crate::logging::log_task_operation;
use crate::models::{SubtaskOperation, SubtaskState, TaskInstance, TaskOperation, TaskState};
use crate::persistence::TaskStore;
use crate::state_machine::guards::{
    NoSubtasksExecutingGuard, NotRollingBackGuard, RollbackAllowedGuard, TaskInStateGuard,
};
use crate::state_machine::{
    StateGuard, SubtaskEvent, SubtaskStateMachine, TaskEvent, TaskStateMachine,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Task-level operator API: queries plus `retry_task` and `rollback_task`
#[derive(Clone)]
pub struct TaskInstanceManager {
    store: Arc<dyn TaskStore>,
}

impl TaskInstanceManager {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn get_task_instance(&self, task_id: i64) -> Result<TaskInstance> {
        self.store.get_task(task_id).await
    }

    pub async fn find_task_instances(&self, state: TaskState) -> Result<Vec<TaskInstance>> {
        self.store.find_tasks_by_state(state).await
    }

    /// Re-ready every FAILED subtask of a FAILED task and resume it.
    ///
    /// A task that failed while rolling back keeps rolling back: its failed
    /// subtasks are re-queued with ROLLBACK instead of RETRY.
    #[instrument(skip(self))]
    pub async fn retry_task(&self, task_id: i64) -> Result<TaskInstance> {
        let mut lock = self.store.lock_task(task_id).await?;
        TaskInStateGuard {
            expected: TaskState::Failed,
        }
        .check(lock.task())?;

        let task = lock.task_mut();
        let (task_operation, subtask_operation) = if task.is_rolling_back() {
            (TaskOperation::Rollback, SubtaskOperation::Rollback)
        } else {
            (TaskOperation::Retry, SubtaskOperation::Retry)
        };

        let mut retried = Vec::new();
        for subtask in task
            .subtasks
            .iter_mut()
            .filter(|s| s.state == SubtaskState::Failed)
        {
            SubtaskStateMachine::transition(subtask, SubtaskEvent::enqueue_manual(subtask_operation))?;
            retried.push(subtask.subtask_id);
        }
        TaskStateMachine::transition(task, TaskEvent::Resume(task_operation))?;

        let task = lock.commit().await?;
        log_task_operation(
            "retry_task",
            task.task_id,
            &task.name,
            "RUNNING",
            Some(&format!("operation {task_operation}, subtasks {retried:?}")),
        );
        Ok(task)
    }

    /// Start undoing a FAILED task in reverse dependency order.
    ///
    /// Subtasks queued but never run go back to PENDING. Every subtask that
    /// has run (or failed) and whose downstreams are all PENDING is queued
    /// for ROLLBACK; the rest follow as the readiness rules allow.
    #[instrument(skip(self))]
    pub async fn rollback_task(&self, task_id: i64) -> Result<TaskInstance> {
        let mut lock = self.store.lock_task(task_id).await?;
        {
            let task = lock.task();
            let guards: [&dyn StateGuard<TaskInstance>; 4] = [
                &TaskInStateGuard {
                    expected: TaskState::Failed,
                },
                &NotRollingBackGuard {
                    requested: "rollback_task",
                },
                &NoSubtasksExecutingGuard,
                &RollbackAllowedGuard,
            ];
            for guard in guards {
                if let Err(e) = guard.check(task) {
                    debug!(task_id, guard = guard.description(), error = %e, "Rollback rejected");
                    return Err(e);
                }
            }
        }

        let task = lock.task_mut();
        for subtask in task
            .subtasks
            .iter_mut()
            .filter(|s| s.state == SubtaskState::Ready && s.run_count == 0)
        {
            SubtaskStateMachine::transition(subtask, SubtaskEvent::Reset)?;
        }
        TaskStateMachine::transition(task, TaskEvent::Resume(TaskOperation::Rollback))?;

        let frontier: Vec<i64> = task
            .subtasks
            .iter()
            .filter(|s| s.state != SubtaskState::Pending)
            .filter(|s| {
                s.downstreams.iter().all(|id| {
                    task.subtask(*id)
                        .is_some_and(|d| d.state == SubtaskState::Pending)
                })
            })
            .map(|s| s.subtask_id)
            .collect();
        for subtask_id in &frontier {
            if let Some(subtask) = task.subtask_mut(*subtask_id) {
                SubtaskStateMachine::transition(
                    subtask,
                    SubtaskEvent::enqueue_manual(SubtaskOperation::Rollback),
                )?;
            }
        }

        let task = lock.commit().await?;
        log_task_operation(
            "rollback_task",
            task.task_id,
            &task.name,
            "RUNNING",
            Some(&format!("rollback frontier {frontier:?}")),
        );
        Ok(task)
    }
}

impl std::fmt::Debug for TaskInstanceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskInstanceManager").finish_non_exhaustive()
    }
}
