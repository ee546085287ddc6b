//! # Engine Bootstrap
//!
//! [`TaskEngine`] is the explicitly owned root of every runtime resource: the
//! store, the subtask registry, both executor pools, the execution registry,
//! the hooks and the two coordinators. Nothing is process-global, so several
//! engines (e.g. one per test) can live side by side.
//!
//! ```rust
//! use ob_task_engine::config::EngineConfig;
//! use ob_task_engine::persistence::InMemoryTaskStore;
//! use ob_task_engine::TaskEngine;
//! use std::sync::Arc;
//!
//! # fn main() -> ob_task_engine::Result<()> {
//! let engine = TaskEngine::builder(Arc::new(InMemoryTaskStore::new()))
//!     .with_config(EngineConfig::default())
//!     .build()?;
//! assert!(!engine.is_running());
//! # Ok(())
//! # }
//! ```

use super::core::OrchestrationCore;
use super::hooks::{SubtaskHook, TaskHook};
use super::polling::CycleReport;
use super::subtask_coordinator::SubtaskCoordinator;
use super::task_coordinator::TaskCoordinator;
use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::Result;
use crate::metrics::{MetricsSink, OpenTelemetryMetricsSink};
use crate::models::{SubtaskInstance, TaskInstance, TaskState};
use crate::persistence::TaskStore;
use crate::registry::SubtaskRegistry;
use crate::subtask::Subtask;
use crate::template::Template;
use std::sync::Arc;
use tracing::info;

pub struct TaskEngineBuilder {
    store: Arc<dyn TaskStore>,
    config: EngineConfig,
    metrics: Option<Arc<dyn MetricsSink>>,
    subtasks: Vec<Arc<dyn Subtask>>,
    task_hooks: Vec<TaskHook>,
    subtask_hooks: Vec<SubtaskHook>,
}

impl TaskEngineBuilder {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            metrics: None,
            subtasks: Vec::new(),
            task_hooks: Vec::new(),
            subtask_hooks: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`OpenTelemetryMetricsSink`]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Pre-register an implementation, e.g. to recover tasks persisted by a
    /// previous process before any template is submitted again
    pub fn register_subtask(mut self, subtask: Arc<dyn Subtask>) -> Self {
        self.subtasks.push(subtask);
        self
    }

    pub fn add_task_hook(mut self, hook: TaskHook) -> Self {
        self.task_hooks.push(hook);
        self
    }

    pub fn add_subtask_hook(mut self, hook: SubtaskHook) -> Self {
        self.subtask_hooks.push(hook);
        self
    }

    pub fn build(self) -> Result<TaskEngine> {
        self.config.validate()?;

        let registry = Arc::new(SubtaskRegistry::new());
        for subtask in self.subtasks {
            registry.register(subtask)?;
        }
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(OpenTelemetryMetricsSink::new()));

        let core = Arc::new(OrchestrationCore::new(self.store, registry, metrics, self.config));
        for hook in self.task_hooks {
            core.hooks.add_task_hook(hook);
        }
        for hook in self.subtask_hooks {
            core.hooks.add_subtask_hook(hook);
        }

        Ok(TaskEngine {
            task_coordinator: TaskCoordinator::new(core.clone()),
            subtask_coordinator: SubtaskCoordinator::new(core.clone()),
            core,
        })
    }
}

pub struct TaskEngine {
    core: Arc<OrchestrationCore>,
    task_coordinator: TaskCoordinator,
    subtask_coordinator: SubtaskCoordinator,
}

impl TaskEngine {
    pub fn builder(store: Arc<dyn TaskStore>) -> TaskEngineBuilder {
        TaskEngineBuilder::new(store)
    }

    pub fn new(store: Arc<dyn TaskStore>, config: EngineConfig) -> Result<Self> {
        Self::builder(store).with_config(config).build()
    }

    /// Connect to Postgres with `config.database`, apply migrations and
    /// build an engine over the resulting store
    #[cfg(feature = "postgres")]
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        let store = crate::persistence::PgTaskStore::connect(&config.database).await?;
        store.migrate().await?;
        Self::new(Arc::new(store), config)
    }

    /// Start the six polling loops. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.subtask_coordinator.startup()?;
        self.task_coordinator.startup()?;
        info!(
            initial_delay_ms = self.core.config.coordinator.initial_delay_ms,
            poll_interval_ms = self.core.config.coordinator.poll_interval_ms,
            "🎉 Task engine started"
        );
        Ok(())
    }

    /// Stop both coordinators and wait for their loops to exit
    pub async fn shutdown(&self) {
        self.task_coordinator.shutdown().await;
        self.subtask_coordinator.shutdown().await;
        info!(
            detached_executions = self.core.executions().len(),
            "✅ Task engine stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.task_coordinator.is_running() || self.subtask_coordinator.is_running()
    }

    /// Run one cycle of every worker, task workers first. Used by embedders
    /// that drive scheduling themselves instead of calling [`start`](Self::start).
    pub async fn tick(&self) -> Vec<Option<CycleReport>> {
        let mut reports = self.task_coordinator.tick().await;
        reports.extend(self.subtask_coordinator.tick().await);
        reports
    }

    pub async fn submit_task(
        &self,
        task_type: &str,
        template: &Template,
        context: Context,
        creator: &str,
    ) -> Result<TaskInstance> {
        self.task_coordinator
            .submit_task(task_type, template, context, creator)
            .await
    }

    pub async fn get_task_instance(&self, task_id: i64) -> Result<TaskInstance> {
        self.task_coordinator.manager().get_task_instance(task_id).await
    }

    pub async fn get_subtask_instance(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        self.subtask_coordinator
            .manager()
            .get_subtask_instance(subtask_id)
            .await
    }

    pub async fn find_task_instances(&self, state: TaskState) -> Result<Vec<TaskInstance>> {
        self.task_coordinator.manager().find_task_instances(state).await
    }

    pub async fn retry_task(&self, task_id: i64) -> Result<TaskInstance> {
        self.task_coordinator.retry_task(task_id).await
    }

    pub async fn rollback_task(&self, task_id: i64) -> Result<TaskInstance> {
        self.task_coordinator.rollback_task(task_id).await
    }

    pub async fn retry_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        self.subtask_coordinator.retry_subtask(subtask_id).await
    }

    pub async fn skip_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        self.subtask_coordinator.skip_subtask(subtask_id).await
    }

    pub async fn cancel_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        self.subtask_coordinator.cancel_subtask(subtask_id).await
    }

    /// Fails with [`ConfigurationError`](crate::TaskEngineError::ConfigurationError) if the kind is
    /// bound to a different implementation
    pub fn register_subtask(&self, subtask: Arc<dyn Subtask>) -> Result<()> {
        self.core.registry.register(subtask)
    }

    pub fn register_template(&self, template: &Template) -> Result<()> {
        self.core.registry.register_template(template)
    }

    pub fn add_task_hook(&self, hook: TaskHook) {
        self.core.hooks.add_task_hook(hook);
    }

    pub fn add_subtask_hook(&self, hook: SubtaskHook) {
        self.core.hooks.add_subtask_hook(hook);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    pub fn registry(&self) -> &Arc<SubtaskRegistry> {
        &self.core.registry
    }

    /// Number of dispatched invocations whose outcome has not been collected
    pub fn pending_executions(&self) -> usize {
        self.core.executions().len()
    }
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("core", &self.core)
            .field("running", &self.is_running())
            .finish()
    }
}
