use crate::constants::workers;
use crate::error::{Result, TaskEngineError};
use crate::models::{SubtaskInstance, SubtaskOperation, SubtaskState, TaskState};
use crate::orchestration::core::OrchestrationCore;
use crate::orchestration::polling::{process_isolated, CycleReport, ItemOutcome, PollingWorker};
use crate::orchestration::task_finalizer::is_auto_retryable;
use crate::state_machine::{SubtaskEvent, SubtaskStateMachine};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Spends the automatic retry budget of FAILED subtasks. Subtasks without
/// budget are left for the running-task worker to fail their task.
pub struct FailedSubtaskWorker {
    core: Arc<OrchestrationCore>,
}

impl FailedSubtaskWorker {
    pub fn new(core: Arc<OrchestrationCore>) -> Self {
        Self { core }
    }

    async fn retry(&self, candidate: SubtaskInstance) -> Result<ItemOutcome> {
        if !is_auto_retryable(&candidate) {
            return Ok(ItemOutcome::Skipped);
        }

        let subtask_id = candidate.subtask_id;
        let mut lock = self.core.store.lock_task(candidate.task_id).await?;
        let task = lock.task_mut();
        if task.state != TaskState::Running {
            return Ok(ItemOutcome::Skipped);
        }

        let operation = if task.is_rolling_back() {
            SubtaskOperation::Rollback
        } else {
            SubtaskOperation::Retry
        };
        let subtask = task
            .subtask_mut(subtask_id)
            .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;
        if !is_auto_retryable(subtask) {
            return Ok(ItemOutcome::Skipped);
        }

        SubtaskStateMachine::transition(subtask, SubtaskEvent::enqueue(operation))?;
        let attempt = subtask.run_count + 1;
        let retry_count = subtask.retry_count;
        lock.commit().await?;

        info!(
            task_id = candidate.task_id,
            subtask_id,
            operation = %operation,
            attempt,
            retry_count,
            "Scheduled automatic retry"
        );
        Ok(ItemOutcome::Processed)
    }
}

#[async_trait]
impl PollingWorker for FailedSubtaskWorker {
    fn name(&self) -> &'static str {
        workers::FAILED_SUBTASK
    }

    async fn poll(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        for candidate in self.core.store.find_subtasks_by_state(SubtaskState::Failed).await? {
            let subtask_id = candidate.subtask_id;
            process_isolated(self.name(), subtask_id, &mut report, self.retry(candidate)).await;
        }
        Ok(report)
    }
}
