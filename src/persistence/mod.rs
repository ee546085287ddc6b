//! # Persistence
//!
//! The engine keeps every piece of mutable runtime state in a [`TaskStore`].
//! Reads return detached snapshots. Writes always go through a [`TaskLock`]:
//! an exclusive, transactional handle over one task row and all of its
//! subtask rows. Coordinator workers and operator calls that touch the same
//! task serialize on that lock, and every compare-and-set of an instance state
//! happens while it is held.
//!
//! Dropping a lock without calling [`TaskLock::commit`] discards every change
//! made through [`TaskLock::task_mut`].

use crate::error::Result;
use crate::models::{NewTaskInstance, SubtaskInstance, SubtaskState, TaskInstance, TaskState};
use async_trait::async_trait;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryTaskStore;
#[cfg(feature = "postgres")]
pub use postgres::PgTaskStore;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a task and its subtask graph in one transaction
    async fn create_task(&self, new_task: NewTaskInstance) -> Result<TaskInstance>;

    async fn get_task(&self, task_id: i64) -> Result<TaskInstance>;

    async fn get_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance>;

    /// Ids in ascending order
    async fn find_task_ids_by_state(&self, state: TaskState) -> Result<Vec<i64>>;

    /// Snapshots across all tasks, ordered by `subtask_id`
    async fn find_subtasks_by_state(&self, state: SubtaskState) -> Result<Vec<SubtaskInstance>>;

    /// Wait for exclusive access to a task and its subtasks
    async fn lock_task(&self, task_id: i64) -> Result<Box<dyn TaskLock>>;

    async fn find_tasks_by_state(&self, state: TaskState) -> Result<Vec<TaskInstance>> {
        let mut tasks = Vec::new();
        for task_id in self.find_task_ids_by_state(state).await? {
            tasks.push(self.get_task(task_id).await?);
        }
        Ok(tasks)
    }
}

#[async_trait]
pub trait TaskLock: Send {
    fn task(&self) -> &TaskInstance;

    fn task_mut(&mut self) -> &mut TaskInstance;

    /// Persist every change and release the lock
    async fn commit(self: Box<Self>) -> Result<TaskInstance>;
}
