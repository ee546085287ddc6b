//! # Orchestration Core
//!
//! Components shared by both coordinators, every polling worker and the
//! instance managers. Constructed once by the engine bootstrap and passed
//! around by `Arc`; nothing here is process-global.

use super::executor_pool::ExecutorPools;
use super::hooks::Hooks;
use super::runner::{ExecutionRegistry, Runner};
use crate::config::EngineConfig;
use crate::metrics::MetricsSink;
use crate::persistence::TaskStore;
use crate::registry::SubtaskRegistry;
use std::sync::Arc;

pub struct OrchestrationCore {
    pub store: Arc<dyn TaskStore>,
    pub registry: Arc<SubtaskRegistry>,
    pub pools: ExecutorPools,
    pub runner: Runner,
    pub hooks: Arc<Hooks>,
    pub metrics: Arc<dyn MetricsSink>,
    pub config: EngineConfig,
}

impl OrchestrationCore {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<SubtaskRegistry>,
        metrics: Arc<dyn MetricsSink>,
        config: EngineConfig,
    ) -> Self {
        let executions = Arc::new(ExecutionRegistry::new());
        Self {
            store,
            registry,
            pools: ExecutorPools::new(&config.executor),
            runner: Runner::new(executions, config.executor.retry_rollback_policy),
            hooks: Arc::new(Hooks::new()),
            metrics,
            config,
        }
    }

    pub fn executions(&self) -> &Arc<ExecutionRegistry> {
        self.runner.executions()
    }

    /// Ceiling on READY + RUNNING + CANCELING subtasks per task
    pub fn task_concurrency(&self) -> usize {
        self.config.coordinator.task_concurrency
    }
}

impl std::fmt::Debug for OrchestrationCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationCore")
            .field("registry", &self.registry)
            .field("pools", &self.pools)
            .field("hooks", &self.hooks)
            .field("config", &self.config)
            .finish()
    }
}
