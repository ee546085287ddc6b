//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

pub mod strategies;
pub mod subtasks;

pub use subtasks::*;

use async_trait::async_trait;
use ob_task_engine::config::EngineConfig;
use ob_task_engine::metrics::MetricsSink;
use ob_task_engine::models::NewTaskInstance;
use ob_task_engine::persistence::{InMemoryTaskStore, TaskLock, TaskStore};
use ob_task_engine::{SubtaskInstance, SubtaskState, TaskEngine, TaskInstance, TaskState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Collects worker names instead of exporting anything
#[derive(Default)]
pub struct RecordingMetrics {
    pub samples: Mutex<Vec<(String, Duration)>>,
}

impl MetricsSink for RecordingMetrics {
    fn record_duration(&self, name: &str, duration: Duration) {
        self.samples.lock().push((name.to_string(), duration));
    }
}

/// Configuration for engines driven by `tick` or by fast loops
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.coordinator.initial_delay_ms = 0;
    config.coordinator.poll_interval_ms = 10;
    config.coordinator.shutdown_timeout_ms = 1_000;
    config
}

pub struct TestEngine {
    pub engine: TaskEngine,
    pub store: Arc<InMemoryTaskStore>,
    pub metrics: Arc<RecordingMetrics>,
}

pub fn test_engine() -> TestEngine {
    test_engine_with(test_config())
}

pub fn test_engine_with(config: EngineConfig) -> TestEngine {
    let store = Arc::new(InMemoryTaskStore::new());
    let metrics = Arc::new(RecordingMetrics::default());
    let engine = TaskEngine::builder(store.clone())
        .with_config(config)
        .with_metrics(metrics.clone())
        .build()
        .expect("test config is valid");
    TestEngine {
        engine,
        store,
        metrics,
    }
}

/// In-memory store whose commits return only `delay` after the write became
/// visible, like a database acknowledging late
pub struct SlowCommitStore {
    inner: InMemoryTaskStore,
    delay: Duration,
}

impl SlowCommitStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryTaskStore::new(),
            delay,
        }
    }
}

struct SlowCommitLock {
    inner: Box<dyn TaskLock>,
    delay: Duration,
}

#[async_trait]
impl TaskLock for SlowCommitLock {
    fn task(&self) -> &TaskInstance {
        self.inner.task()
    }

    fn task_mut(&mut self) -> &mut TaskInstance {
        self.inner.task_mut()
    }

    async fn commit(self: Box<Self>) -> ob_task_engine::Result<TaskInstance> {
        let task = self.inner.commit().await?;
        tokio::time::sleep(self.delay).await;
        Ok(task)
    }
}

#[async_trait]
impl TaskStore for SlowCommitStore {
    async fn create_task(&self, new_task: NewTaskInstance) -> ob_task_engine::Result<TaskInstance> {
        self.inner.create_task(new_task).await
    }

    async fn get_task(&self, task_id: i64) -> ob_task_engine::Result<TaskInstance> {
        self.inner.get_task(task_id).await
    }

    async fn get_subtask(&self, subtask_id: i64) -> ob_task_engine::Result<SubtaskInstance> {
        self.inner.get_subtask(subtask_id).await
    }

    async fn find_task_ids_by_state(&self, state: TaskState) -> ob_task_engine::Result<Vec<i64>> {
        self.inner.find_task_ids_by_state(state).await
    }

    async fn find_subtasks_by_state(&self, state: SubtaskState) -> ob_task_engine::Result<Vec<SubtaskInstance>> {
        self.inner.find_subtasks_by_state(state).await
    }

    async fn lock_task(&self, task_id: i64) -> ob_task_engine::Result<Box<dyn TaskLock>> {
        let inner = self.inner.lock_task(task_id).await?;
        Ok(Box::new(SlowCommitLock {
            inner,
            delay: self.delay,
        }))
    }
}

/// Tick the engine until `done` holds for the task, or panic after 10s
pub async fn drive_until<F>(engine: &TaskEngine, task_id: i64, done: F) -> TaskInstance
where
    F: Fn(&TaskInstance) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        engine.tick().await;
        let task = engine
            .get_task_instance(task_id)
            .await
            .expect("task exists");
        if done(&task) {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached; last snapshot: {task:#?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait for the background loops (no ticking) until `done` holds
pub async fn wait_until<F>(engine: &TaskEngine, task_id: i64, done: F) -> TaskInstance
where
    F: Fn(&TaskInstance) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = engine
            .get_task_instance(task_id)
            .await
            .expect("task exists");
        if done(&task) {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached; last snapshot: {task:#?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn is_terminal(task: &TaskInstance) -> bool {
    task.state.is_terminal()
}

/// Subtask instance by name; panics if there is not exactly one
pub fn subtask_named<'a>(task: &'a TaskInstance, name: &str) -> &'a SubtaskInstance {
    let mut matches = task.subtasks.iter().filter(|s| s.name == name);
    let subtask = matches.next().unwrap_or_else(|| panic!("no subtask named {name}"));
    assert!(matches.next().is_none(), "more than one subtask named {name}");
    subtask
}
