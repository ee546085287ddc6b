use super::{TaskLock, TaskStore};
use crate::error::{Result, TaskEngineError};
use crate::models::{
    NewTaskInstance, SubtaskInstance, SubtaskOperation, SubtaskState, TaskInstance, TaskOperation,
    TaskState,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Process-local store with one async mutex per task
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<i64, Arc<Mutex<TaskInstance>>>,
    subtask_owners: DashMap<i64, i64>,
    next_task_id: AtomicI64,
    next_subtask_id: AtomicI64,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, task_id: i64) -> Result<Arc<Mutex<TaskInstance>>> {
        // Clone the Arc so no map shard stays locked across an await
        self.tasks
            .get(&task_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TaskEngineError::TaskNotFound(task_id))
    }

    fn all_entries(&self) -> Vec<Arc<Mutex<TaskInstance>>> {
        let mut entries: Vec<(i64, Arc<Mutex<TaskInstance>>)> = self
            .tasks
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        entries.sort_by_key(|(task_id, _)| *task_id);
        entries.into_iter().map(|(_, task)| task).collect()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, new_task: NewTaskInstance) -> Result<TaskInstance> {
        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();

        // Ids of one task are allocated as a contiguous block
        let count = new_task.subtasks.len() as i64;
        let first_id = self.next_subtask_id.fetch_add(count, Ordering::SeqCst) + 1;
        let ids: Vec<i64> = (first_id..first_id + count).collect();

        let mut subtasks = Vec::with_capacity(new_task.subtasks.len());
        for (idx, new_subtask) in new_task.subtasks.into_iter().enumerate() {
            let mut upstreams = Vec::with_capacity(new_subtask.upstreams.len());
            for upstream in new_subtask.upstreams {
                if upstream >= idx {
                    return Err(TaskEngineError::Internal(format!(
                        "subtask {idx} depends on later subtask {upstream}"
                    )));
                }
                upstreams.push(ids[upstream]);
            }
            upstreams.sort_unstable();
            upstreams.dedup();

            subtasks.push(SubtaskInstance {
                subtask_id: ids[idx],
                task_id,
                name: new_subtask.name,
                kind: new_subtask.kind,
                state: SubtaskState::Pending,
                operation: SubtaskOperation::Execute,
                run_count: 0,
                retry_count: new_subtask.retry_count,
                timeout_seconds: new_subtask.timeout_seconds,
                prohibit_rollback: new_subtask.prohibit_rollback,
                split_key: new_subtask.split_key,
                split_value: new_subtask.split_value,
                manual: false,
                error_message: None,
                upstreams,
                downstreams: Vec::new(),
                created_at: now,
                updated_at: now,
                started_at: None,
                finished_at: None,
            });
        }

        for idx in 0..subtasks.len() {
            let id = subtasks[idx].subtask_id;
            for upstream in subtasks[idx].upstreams.clone() {
                let position = (upstream - first_id) as usize;
                subtasks[position].downstreams.push(id);
            }
        }

        let task = TaskInstance {
            task_id,
            task_type: new_task.task_type,
            name: new_task.name,
            state: TaskState::Running,
            operation: TaskOperation::Execute,
            creator: new_task.creator,
            context: new_task.context,
            created_at: now,
            updated_at: now,
            finished_at: None,
            subtasks,
        };

        for id in &ids {
            self.subtask_owners.insert(*id, task_id);
        }
        self.tasks
            .insert(task_id, Arc::new(Mutex::new(task.clone())));

        Ok(task)
    }

    async fn get_task(&self, task_id: i64) -> Result<TaskInstance> {
        let entry = self.entry(task_id)?;
        let task = entry.lock().await;
        Ok(task.clone())
    }

    async fn get_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        let task_id = self
            .subtask_owners
            .get(&subtask_id)
            .map(|owner| *owner.value())
            .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;

        let entry = self.entry(task_id)?;
        let task = entry.lock().await;
        task.subtask(subtask_id)
            .cloned()
            .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))
    }

    async fn find_task_ids_by_state(&self, state: TaskState) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        for entry in self.all_entries() {
            let task = entry.lock().await;
            if task.state == state {
                ids.push(task.task_id);
            }
        }
        Ok(ids)
    }

    async fn find_subtasks_by_state(&self, state: SubtaskState) -> Result<Vec<SubtaskInstance>> {
        let mut subtasks = Vec::new();
        for entry in self.all_entries() {
            let task = entry.lock().await;
            subtasks.extend(task.subtasks_in_state(state).cloned());
        }
        subtasks.sort_by_key(|s| s.subtask_id);
        Ok(subtasks)
    }

    async fn lock_task(&self, task_id: i64) -> Result<Box<dyn TaskLock>> {
        let guard = self.entry(task_id)?.lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTaskLock { guard, working }))
    }
}

struct MemoryTaskLock {
    guard: OwnedMutexGuard<TaskInstance>,
    working: TaskInstance,
}

#[async_trait]
impl TaskLock for MemoryTaskLock {
    fn task(&self) -> &TaskInstance {
        &self.working
    }

    fn task_mut(&mut self) -> &mut TaskInstance {
        &mut self.working
    }

    async fn commit(self: Box<Self>) -> Result<TaskInstance> {
        let MemoryTaskLock { mut guard, working } = *self;
        *guard = working.clone();
        Ok(working)
    }
}
