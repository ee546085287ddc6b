use crate::error::{Result, TaskEngineError};
use crate::logging::log_subtask_operation;
use crate::models::{SubtaskInstance, SubtaskOperation, SubtaskState, TaskInstance, TaskState};
use crate::persistence::{TaskLock, TaskStore};
use crate::state_machine::guards::{NotRollingBackGuard, SubtaskInStateGuard};
use crate::state_machine::{
    StateGuard, SubtaskEvent, SubtaskStateMachine, TaskEvent, TaskStateMachine,
};
use std::sync::Arc;
use tracing::instrument;

/// Subtask-level operator API: retry, skip and cancel
#[derive(Clone)]
pub struct SubtaskInstanceManager {
    store: Arc<dyn TaskStore>,
}

impl SubtaskInstanceManager {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn get_subtask_instance(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        self.store.get_subtask(subtask_id).await
    }

    /// Re-run a FAILED subtask. Not available while the task rolls back.
    #[instrument(skip(self))]
    pub async fn retry_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        let mut lock = self.lock_owner(subtask_id).await?;
        check_all(
            lock.task(),
            &[
                &SubtaskInStateGuard {
                    subtask_id,
                    expected: SubtaskState::Failed,
                },
                &NotRollingBackGuard {
                    requested: "retry_subtask",
                },
            ],
        )?;

        requeue(
            lock.task_mut(),
            subtask_id,
            SubtaskEvent::enqueue_manual(SubtaskOperation::Retry),
        )?;
        self.commit(lock, subtask_id, "retry_subtask").await
    }

    /// Resolve a FAILED subtask without running it again. Under rollback the
    /// instance counts as undone.
    #[instrument(skip(self))]
    pub async fn skip_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        let mut lock = self.lock_owner(subtask_id).await?;
        check_all(
            lock.task(),
            &[&SubtaskInStateGuard {
                subtask_id,
                expected: SubtaskState::Failed,
            }],
        )?;

        let operation = if lock.task().is_rolling_back() {
            SubtaskOperation::RollbackSkip
        } else {
            SubtaskOperation::Skip
        };
        requeue(lock.task_mut(), subtask_id, SubtaskEvent::enqueue_manual(operation))?;
        self.commit(lock, subtask_id, "skip_subtask").await
    }

    /// Ask a RUNNING subtask to stop. The canceling-subtask worker forwards
    /// the request and fails the instance once its invocation returns.
    #[instrument(skip(self))]
    pub async fn cancel_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        let mut lock = self.lock_owner(subtask_id).await?;
        check_all(
            lock.task(),
            &[&SubtaskInStateGuard {
                subtask_id,
                expected: SubtaskState::Running,
            }],
        )?;

        let subtask = lock
            .task_mut()
            .subtask_mut(subtask_id)
            .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;
        SubtaskStateMachine::transition(subtask, SubtaskEvent::RequestCancel)?;
        self.commit(lock, subtask_id, "cancel_subtask").await
    }

    async fn lock_owner(&self, subtask_id: i64) -> Result<Box<dyn TaskLock>> {
        let subtask = self.store.get_subtask(subtask_id).await?;
        self.store.lock_task(subtask.task_id).await
    }

    async fn commit(
        &self,
        lock: Box<dyn TaskLock>,
        subtask_id: i64,
        operation: &str,
    ) -> Result<SubtaskInstance> {
        let task = lock.commit().await?;
        let subtask = task
            .subtask(subtask_id)
            .cloned()
            .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;

        log_subtask_operation(
            operation,
            task.task_id,
            subtask_id,
            &subtask.name,
            &subtask.state.to_string(),
            Some(&format!("operation {}", subtask.operation)),
        );
        Ok(subtask)
    }
}

impl std::fmt::Debug for SubtaskInstanceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtaskInstanceManager").finish_non_exhaustive()
    }
}

fn check_all(task: &TaskInstance, guards: &[&dyn StateGuard<TaskInstance>]) -> Result<()> {
    guards.iter().try_for_each(|guard| guard.check(task))
}

/// Queue `subtask_id` again and resume its task if the failure had stopped it
fn requeue(task: &mut TaskInstance, subtask_id: i64, event: SubtaskEvent) -> Result<()> {
    let subtask = task
        .subtask_mut(subtask_id)
        .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;
    SubtaskStateMachine::transition(subtask, event)?;

    if task.state == TaskState::Failed {
        let operation = task.operation;
        TaskStateMachine::transition(task, TaskEvent::Resume(operation))?;
    }
    Ok(())
}
