//! # Task Coordinator
//!
//! Entry point for submissions and owner of the task-level polling loops:
//! [`ReadyTaskWorker`] primes viable subtasks within the per-task ceiling and
//! [`RunningTaskWorker`] derives each task's state from its subtasks.

use super::core::OrchestrationCore;
use super::polling::{CycleReport, PollingWorker, WorkerGroup};
use super::task_initializer::TaskInitializer;
use super::workers::{ReadyTaskWorker, RunningTaskWorker};
use crate::context::Context;
use crate::error::Result;
use crate::logging::log_task_operation;
use crate::models::TaskInstance;
use crate::services::TaskInstanceManager;
use crate::template::Template;
use std::sync::Arc;
use tracing::instrument;

pub struct TaskCoordinator {
    core: Arc<OrchestrationCore>,
    manager: TaskInstanceManager,
    workers: WorkerGroup,
}

impl TaskCoordinator {
    pub fn new(core: Arc<OrchestrationCore>) -> Self {
        let workers: Vec<Arc<dyn PollingWorker>> = vec![
            Arc::new(ReadyTaskWorker::new(core.clone())),
            Arc::new(RunningTaskWorker::new(core.clone())),
        ];
        Self {
            manager: TaskInstanceManager::new(core.store.clone()),
            workers: WorkerGroup::new("task_coordinator", workers),
            core,
        }
    }

    /// Materialize `template` over `context` and persist it as a RUNNING task.
    /// Subtask implementations of the template are registered on the way so
    /// the subtask workers can resolve them. A template whose subtask kind is
    /// already bound to another implementation is rejected before anything is
    /// persisted.
    #[instrument(skip(self, template, context), fields(template = %template.name()))]
    pub async fn submit_task(
        &self,
        task_type: &str,
        template: &Template,
        context: Context,
        creator: &str,
    ) -> Result<TaskInstance> {
        let new_task = TaskInitializer::build_new_task(task_type, template, context, creator)?;
        self.core.registry.register_template(template)?;

        let task = self.core.store.create_task(new_task).await?;
        log_task_operation(
            "submit_task",
            task.task_id,
            &task.name,
            "RUNNING",
            Some(&format!("{} subtasks, creator {}", task.subtasks.len(), task.creator)),
        );
        Ok(task)
    }

    pub async fn retry_task(&self, task_id: i64) -> Result<TaskInstance> {
        self.manager.retry_task(task_id).await
    }

    pub async fn rollback_task(&self, task_id: i64) -> Result<TaskInstance> {
        self.manager.rollback_task(task_id).await
    }

    pub fn manager(&self) -> &TaskInstanceManager {
        &self.manager
    }

    /// Start both loops after the configured initial delay
    pub fn startup(&self) -> Result<()> {
        let config = &self.core.config.coordinator;
        self.workers
            .start(&self.core.metrics, config.initial_delay(), config.poll_interval())
    }

    pub async fn shutdown(&self) {
        self.workers
            .stop(self.core.config.coordinator.shutdown_timeout())
            .await;
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_running()
    }

    /// One cycle of each task worker, outside the timers
    pub async fn tick(&self) -> Vec<Option<CycleReport>> {
        self.workers.tick(self.core.metrics.as_ref()).await
    }
}
