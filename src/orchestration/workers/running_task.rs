use crate::constants::workers;
use crate::error::Result;
use crate::logging::log_task_operation;
use crate::models::TaskState;
use crate::orchestration::core::OrchestrationCore;
use crate::orchestration::polling::{process_isolated, CycleReport, ItemOutcome, PollingWorker};
use crate::orchestration::task_finalizer::{TaskFinalizer, TaskOutcome};
use async_trait::async_trait;
use std::sync::Arc;

/// Moves RUNNING tasks to SUCCESSFUL or FAILED once their subtasks allow it
/// and runs the task hooks
pub struct RunningTaskWorker {
    core: Arc<OrchestrationCore>,
}

impl RunningTaskWorker {
    pub fn new(core: Arc<OrchestrationCore>) -> Self {
        Self { core }
    }

    async fn finalize(&self, task_id: i64) -> Result<ItemOutcome> {
        let mut lock = self.core.store.lock_task(task_id).await?;
        if lock.task().state != TaskState::Running {
            return Ok(ItemOutcome::Skipped);
        }

        let outcome = TaskFinalizer::finalize(lock.task_mut())?;
        if outcome == TaskOutcome::InProgress {
            return Ok(ItemOutcome::Skipped);
        }

        let task = lock.commit().await?;
        log_task_operation(
            "finalize_task",
            task.task_id,
            &task.name,
            &task.state.to_string(),
            Some(&format!("operation {}", task.operation)),
        );
        self.core.hooks.run_task_hooks(&task);
        Ok(ItemOutcome::Processed)
    }
}

#[async_trait]
impl PollingWorker for RunningTaskWorker {
    fn name(&self) -> &'static str {
        workers::RUNNING_TASK
    }

    async fn poll(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        for task_id in self.core.store.find_task_ids_by_state(TaskState::Running).await? {
            process_isolated(self.name(), task_id, &mut report, self.finalize(task_id)).await;
        }
        Ok(report)
    }
}
