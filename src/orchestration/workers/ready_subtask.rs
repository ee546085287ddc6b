use super::fail_subtask;
use crate::constants::workers;
use crate::error::{Result, TaskEngineError};
use crate::logging::log_subtask_operation;
use crate::models::{SubtaskInstance, SubtaskState, TaskState};
use crate::orchestration::core::OrchestrationCore;
use crate::orchestration::polling::{process_isolated, CycleReport, ItemOutcome, PollingWorker};
use crate::orchestration::viable_subtask_discovery::{dependencies_satisfied, promote_viable_subtasks};
use crate::state_machine::{SubtaskEvent, SubtaskStateMachine};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Dispatches READY subtasks whose dependencies still hold, and resolves
/// skipped ones without running them
pub struct ReadySubtaskWorker {
    core: Arc<OrchestrationCore>,
}

impl ReadySubtaskWorker {
    pub fn new(core: Arc<OrchestrationCore>) -> Self {
        Self { core }
    }

    async fn handle(&self, candidate: SubtaskInstance) -> Result<ItemOutcome> {
        if candidate.operation.is_skip() {
            self.resolve_skip(candidate).await
        } else {
            self.dispatch(candidate).await
        }
    }

    #[instrument(skip(self, candidate), fields(task_id = candidate.task_id, subtask_id = candidate.subtask_id))]
    async fn dispatch(&self, candidate: SubtaskInstance) -> Result<ItemOutcome> {
        let subtask_id = candidate.subtask_id;
        let implementation = self.core.registry.get(&candidate.kind);

        // Claim the slot before touching state; no slot means try again next cycle
        let permit = match implementation {
            Some(_) => match self.core.pools.try_acquire(candidate.manual) {
                Some(permit) => Some(permit),
                None => {
                    debug!(manual = candidate.manual, "Executor pool exhausted");
                    return Ok(ItemOutcome::Skipped);
                }
            },
            None => None,
        };

        let mut lock = self.core.store.lock_task(candidate.task_id).await?;
        let task = lock.task();
        let subtask = task
            .subtask(subtask_id)
            .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;

        let dispatchable = task.state == TaskState::Running
            && subtask.state == SubtaskState::Ready
            && !subtask.operation.is_skip()
            && (subtask.manual || !task.has_failed_subtask())
            && dependencies_satisfied(task, subtask);
        if !dispatchable {
            return Ok(ItemOutcome::Skipped);
        }

        let (Some(implementation), Some(permit)) = (implementation, permit) else {
            let message = TaskEngineError::SubtaskNotRegistered(candidate.kind.clone()).to_string();
            fail_subtask(&self.core, lock, subtask_id, self.name(), message).await?;
            return Ok(ItemOutcome::Processed);
        };

        let subtask = lock
            .task_mut()
            .subtask_mut(subtask_id)
            .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;
        SubtaskStateMachine::transition(subtask, SubtaskEvent::Start)?;

        // Register the handle before RUNNING becomes visible to other workers.
        // An error below drops `pending`, which withdraws the execution.
        let task = lock.task();
        let instance = task
            .subtask(subtask_id)
            .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;
        let context = instance.invocation_context(&task.context);
        let pending = self
            .core
            .runner
            .dispatch(instance, implementation, context, permit);

        lock.commit().await?;
        if let Some(pending) = pending {
            pending.release();
        }
        Ok(ItemOutcome::Processed)
    }

    async fn resolve_skip(&self, candidate: SubtaskInstance) -> Result<ItemOutcome> {
        let subtask_id = candidate.subtask_id;
        let mut lock = self.core.store.lock_task(candidate.task_id).await?;

        let task = lock.task_mut();
        if task.state != TaskState::Running {
            return Ok(ItemOutcome::Skipped);
        }
        let subtask = task
            .subtask_mut(subtask_id)
            .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;
        if subtask.state != SubtaskState::Ready || !subtask.operation.is_skip() {
            return Ok(ItemOutcome::Skipped);
        }

        SubtaskStateMachine::transition(subtask, SubtaskEvent::Complete)?;
        let operation = subtask.operation;
        promote_viable_subtasks(task, self.core.task_concurrency());

        let task = lock.commit().await?;
        if let Some(subtask) = task.subtask(subtask_id) {
            log_subtask_operation(
                self.name(),
                task.task_id,
                subtask_id,
                &subtask.name,
                "SUCCESSFUL",
                Some(&format!("resolved by {operation}")),
            );
            self.core.hooks.run_subtask_hooks(subtask);
        }
        Ok(ItemOutcome::Processed)
    }
}

#[async_trait]
impl PollingWorker for ReadySubtaskWorker {
    fn name(&self) -> &'static str {
        workers::READY_SUBTASK
    }

    async fn poll(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        for candidate in self.core.store.find_subtasks_by_state(SubtaskState::Ready).await? {
            let subtask_id = candidate.subtask_id;
            process_isolated(self.name(), subtask_id, &mut report, self.handle(candidate)).await;
        }
        Ok(report)
    }
}
