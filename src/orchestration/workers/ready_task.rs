use crate::constants::workers;
use crate::error::Result;
use crate::models::TaskState;
use crate::orchestration::core::OrchestrationCore;
use crate::orchestration::polling::{process_isolated, CycleReport, ItemOutcome, PollingWorker};
use crate::orchestration::viable_subtask_discovery::promote_viable_subtasks;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Promotes graph-eligible subtasks of RUNNING tasks to READY, bounded by the
/// per-task concurrency ceiling
pub struct ReadyTaskWorker {
    core: Arc<OrchestrationCore>,
}

impl ReadyTaskWorker {
    pub fn new(core: Arc<OrchestrationCore>) -> Self {
        Self { core }
    }

    async fn promote(&self, task_id: i64) -> Result<ItemOutcome> {
        let mut lock = self.core.store.lock_task(task_id).await?;
        if lock.task().state != TaskState::Running {
            return Ok(ItemOutcome::Skipped);
        }

        let promoted = promote_viable_subtasks(lock.task_mut(), self.core.task_concurrency());
        if promoted.is_empty() {
            return Ok(ItemOutcome::Skipped);
        }

        lock.commit().await?;
        debug!(task_id, promoted = promoted.len(), "Primed subtasks");
        Ok(ItemOutcome::Processed)
    }
}

#[async_trait]
impl PollingWorker for ReadyTaskWorker {
    fn name(&self) -> &'static str {
        workers::READY_TASK
    }

    async fn poll(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        for task_id in self.core.store.find_task_ids_by_state(TaskState::Running).await? {
            process_isolated(self.name(), task_id, &mut report, self.promote(task_id)).await;
        }
        Ok(report)
    }
}
