//! # Subtask Coordinator
//!
//! Owns the four subtask-level polling loops. Dispatch goes through the
//! shared [`Runner`](super::runner::Runner); execution slots come from the
//! automatic or the manual pool depending on who queued the instance.

use super::core::OrchestrationCore;
use super::polling::{CycleReport, PollingWorker, WorkerGroup};
use super::workers::{
    CancelingSubtaskWorker, FailedSubtaskWorker, ReadySubtaskWorker, RunningSubtaskWorker,
};
use crate::error::{Result, TaskEngineError};
use crate::models::SubtaskInstance;
use crate::services::SubtaskInstanceManager;
use std::sync::Arc;

pub struct SubtaskCoordinator {
    core: Arc<OrchestrationCore>,
    manager: SubtaskInstanceManager,
    workers: WorkerGroup,
}

impl SubtaskCoordinator {
    pub fn new(core: Arc<OrchestrationCore>) -> Self {
        let workers: Vec<Arc<dyn PollingWorker>> = vec![
            Arc::new(ReadySubtaskWorker::new(core.clone())),
            Arc::new(RunningSubtaskWorker::new(core.clone())),
            Arc::new(CancelingSubtaskWorker::new(core.clone())),
            Arc::new(FailedSubtaskWorker::new(core.clone())),
        ];
        Self {
            manager: SubtaskInstanceManager::new(core.store.clone()),
            workers: WorkerGroup::new("subtask_coordinator", workers),
            core,
        }
    }

    pub async fn retry_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        self.manager.retry_subtask(subtask_id).await
    }

    pub async fn skip_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        self.manager.skip_subtask(subtask_id).await
    }

    pub async fn cancel_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        self.manager.cancel_subtask(subtask_id).await
    }

    pub fn manager(&self) -> &SubtaskInstanceManager {
        &self.manager
    }

    /// Start the four loops. A coordinator that has been shut down cannot
    /// be started again since its executor pools are closed.
    pub fn startup(&self) -> Result<()> {
        if self.core.pools.is_closed() {
            return Err(TaskEngineError::Internal(
                "subtask coordinator has been shut down".to_string(),
            ));
        }
        let config = &self.core.config.coordinator;
        self.workers
            .start(&self.core.metrics, config.initial_delay(), config.poll_interval())
    }

    /// Stop polling and close the executor pools. Invocations already
    /// dispatched keep running; their handles stay in the execution registry.
    pub async fn shutdown(&self) {
        self.workers
            .stop(self.core.config.coordinator.shutdown_timeout())
            .await;
        self.core.pools.close();
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_running()
    }

    pub async fn tick(&self) -> Vec<Option<CycleReport>> {
        self.workers.tick(self.core.metrics.as_ref()).await
    }
}
