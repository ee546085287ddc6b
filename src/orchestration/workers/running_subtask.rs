use super::fail_subtask;
use crate::constants::{failure_messages, workers};
use crate::context::Context;
use crate::error::{Result, TaskEngineError};
use crate::logging::log_subtask_operation;
use crate::models::{SubtaskInstance, SubtaskState};
use crate::orchestration::core::OrchestrationCore;
use crate::orchestration::polling::{process_isolated, CycleReport, ItemOutcome, PollingWorker};
use crate::orchestration::runner::ExecutionResult;
use crate::orchestration::viable_subtask_discovery::promote_viable_subtasks;
use crate::persistence::TaskLock;
use crate::state_machine::{SubtaskEvent, SubtaskStateMachine};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Polls execution handles of RUNNING subtasks for completion, timeout or
/// loss, and records the outcome
pub struct RunningSubtaskWorker {
    core: Arc<OrchestrationCore>,
}

impl RunningSubtaskWorker {
    pub fn new(core: Arc<OrchestrationCore>) -> Self {
        Self { core }
    }

    async fn check(&self, candidate: SubtaskInstance) -> Result<ItemOutcome> {
        let executions = self.core.executions();
        let subtask_id = candidate.subtask_id;

        match executions.is_finished(subtask_id) {
            None => self.fail_lost(&candidate).await,
            Some(true) => {
                let Some(execution) = executions.take(subtask_id) else {
                    return Ok(ItemOutcome::Skipped);
                };
                match execution.into_result().await {
                    ExecutionResult::Succeeded(output) => self.complete(&candidate, output).await,
                    ExecutionResult::Failed(message) => self.fail_if_running(&candidate, message).await,
                }
            }
            Some(false) => {
                if executions.is_timed_out(subtask_id) != Some(true) {
                    return Ok(ItemOutcome::Skipped);
                }
                executions.request_cancel(subtask_id);
                let message = format!("timed out after {}s", candidate.timeout_seconds);
                let outcome = self.fail_if_running(&candidate, message).await?;
                if outcome == ItemOutcome::Processed {
                    if let Some(execution) = executions.take(subtask_id) {
                        execution.abandon();
                    }
                }
                Ok(outcome)
            }
        }
    }

    /// Lock the owning task if the subtask is still RUNNING
    async fn lock_running(&self, candidate: &SubtaskInstance) -> Result<Option<Box<dyn TaskLock>>> {
        let lock = self.core.store.lock_task(candidate.task_id).await?;
        let still_running = lock
            .task()
            .subtask(candidate.subtask_id)
            .is_some_and(|s| s.state == SubtaskState::Running);
        if !still_running {
            debug!(subtask_id = candidate.subtask_id, "Subtask left RUNNING before failure was recorded");
            return Ok(None);
        }
        Ok(Some(lock))
    }

    async fn fail_if_running(&self, candidate: &SubtaskInstance, message: String) -> Result<ItemOutcome> {
        let Some(lock) = self.lock_running(candidate).await? else {
            return Ok(ItemOutcome::Skipped);
        };
        fail_subtask(&self.core, lock, candidate.subtask_id, self.name(), message).await?;
        Ok(ItemOutcome::Processed)
    }

    /// Fail a RUNNING subtask whose handle is gone. The handle is looked up
    /// again under the lock: a dispatch registers it before committing.
    async fn fail_lost(&self, candidate: &SubtaskInstance) -> Result<ItemOutcome> {
        let Some(lock) = self.lock_running(candidate).await? else {
            return Ok(ItemOutcome::Skipped);
        };
        if self.core.executions().contains(candidate.subtask_id) {
            debug!(subtask_id = candidate.subtask_id, "Execution handle registered after the scan");
            return Ok(ItemOutcome::Skipped);
        }
        let message = failure_messages::EXECUTION_LOST.to_string();
        fail_subtask(&self.core, lock, candidate.subtask_id, self.name(), message).await?;
        Ok(ItemOutcome::Processed)
    }

    async fn complete(&self, candidate: &SubtaskInstance, mut output: Context) -> Result<ItemOutcome> {
        let subtask_id = candidate.subtask_id;
        let mut lock = self.core.store.lock_task(candidate.task_id).await?;

        let task = lock.task_mut();
        let subtask = task
            .subtask_mut(subtask_id)
            .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;
        if subtask.state != SubtaskState::Running {
            warn!(
                task_id = candidate.task_id,
                subtask_id,
                state = %subtask.state,
                "Discarding result of a subtask that is no longer RUNNING"
            );
            return Ok(ItemOutcome::Skipped);
        }

        SubtaskStateMachine::transition(subtask, SubtaskEvent::Complete)?;

        // The split element is per-instance and stays out of the task context
        if let Some(key) = &subtask.split_key {
            output.remove(key);
        }
        task.context.merge(output);
        promote_viable_subtasks(task, self.core.task_concurrency());

        let task = lock.commit().await?;
        if let Some(subtask) = task.subtask(subtask_id) {
            log_subtask_operation(
                self.name(),
                task.task_id,
                subtask_id,
                &subtask.name,
                "SUCCESSFUL",
                Some(&format!("operation {}", subtask.operation)),
            );
            self.core.hooks.run_subtask_hooks(subtask);
        }
        Ok(ItemOutcome::Processed)
    }
}

#[async_trait]
impl PollingWorker for RunningSubtaskWorker {
    fn name(&self) -> &'static str {
        workers::RUNNING_SUBTASK
    }

    async fn poll(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        for candidate in self.core.store.find_subtasks_by_state(SubtaskState::Running).await? {
            let subtask_id = candidate.subtask_id;
            process_isolated(self.name(), subtask_id, &mut report, self.check(candidate)).await;
        }
        Ok(report)
    }
}
