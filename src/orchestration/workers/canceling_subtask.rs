use super::fail_subtask;
use crate::constants::{failure_messages, workers};
use crate::error::Result;
use crate::models::{SubtaskInstance, SubtaskState};
use crate::orchestration::core::OrchestrationCore;
use crate::orchestration::polling::{process_isolated, CycleReport, ItemOutcome, PollingWorker};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Forwards cancellation to CANCELING subtasks and marks them FAILED once
/// their invocation has returned
pub struct CancelingSubtaskWorker {
    core: Arc<OrchestrationCore>,
}

impl CancelingSubtaskWorker {
    pub fn new(core: Arc<OrchestrationCore>) -> Self {
        Self { core }
    }

    async fn check(&self, candidate: SubtaskInstance) -> Result<ItemOutcome> {
        let executions = self.core.executions();
        let subtask_id = candidate.subtask_id;

        match executions.is_finished(subtask_id) {
            Some(false) => {
                if executions.request_cancel(subtask_id) == Some(true) {
                    info!(
                        task_id = candidate.task_id,
                        subtask_id,
                        "Requested subtask cancellation"
                    );
                    return Ok(ItemOutcome::Processed);
                }
                Ok(ItemOutcome::Skipped)
            }
            Some(true) => {
                if let Some(execution) = executions.take(subtask_id) {
                    let result = execution.into_result().await;
                    debug!(subtask_id, result = ?result, "Canceled invocation returned");
                }
                self.fail_canceled(&candidate).await
            }
            None => self.fail_canceled(&candidate).await,
        }
    }

    async fn fail_canceled(&self, candidate: &SubtaskInstance) -> Result<ItemOutcome> {
        let lock = self.core.store.lock_task(candidate.task_id).await?;
        let still_canceling = lock
            .task()
            .subtask(candidate.subtask_id)
            .is_some_and(|s| s.state == SubtaskState::Canceling);
        if !still_canceling {
            return Ok(ItemOutcome::Skipped);
        }
        if self.core.executions().contains(candidate.subtask_id) {
            debug!(subtask_id = candidate.subtask_id, "Canceled invocation is still tracked");
            return Ok(ItemOutcome::Skipped);
        }

        fail_subtask(
            &self.core,
            lock,
            candidate.subtask_id,
            self.name(),
            failure_messages::CANCELED.to_string(),
        )
        .await?;
        Ok(ItemOutcome::Processed)
    }
}

#[async_trait]
impl PollingWorker for CancelingSubtaskWorker {
    fn name(&self) -> &'static str {
        workers::CANCELING_SUBTASK
    }

    async fn poll(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        for candidate in self.core.store.find_subtasks_by_state(SubtaskState::Canceling).await? {
            let subtask_id = candidate.subtask_id;
            process_isolated(self.name(), subtask_id, &mut report, self.check(candidate)).await;
        }
        Ok(report)
    }
}
