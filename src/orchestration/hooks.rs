//! Callbacks invoked after a task or subtask reaches a terminal state.
//!
//! Hooks run in registration order on the worker that made the transition,
//! after the transition has been committed. A panicking hook is logged and
//! does not prevent the remaining hooks from running.

use crate::models::{SubtaskInstance, TaskInstance};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

pub type TaskHook = Arc<dyn Fn(&TaskInstance) + Send + Sync>;
pub type SubtaskHook = Arc<dyn Fn(&SubtaskInstance) + Send + Sync>;

#[derive(Default)]
pub struct Hooks {
    task_hooks: RwLock<Vec<TaskHook>>,
    subtask_hooks: RwLock<Vec<SubtaskHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task_hook(&self, hook: TaskHook) {
        self.task_hooks.write().push(hook);
    }

    pub fn add_subtask_hook(&self, hook: SubtaskHook) {
        self.subtask_hooks.write().push(hook);
    }

    pub fn run_task_hooks(&self, task: &TaskInstance) {
        // Snapshot so a hook may register further hooks
        let hooks = self.task_hooks.read().clone();
        for hook in hooks {
            if catch_unwind(AssertUnwindSafe(|| hook(task))).is_err() {
                error!(task_id = task.task_id, "Task hook panicked");
            }
        }
    }

    pub fn run_subtask_hooks(&self, subtask: &SubtaskInstance) {
        let hooks = self.subtask_hooks.read().clone();
        for hook in hooks {
            if catch_unwind(AssertUnwindSafe(|| hook(subtask))).is_err() {
                error!(
                    task_id = subtask.task_id,
                    subtask_id = subtask.subtask_id,
                    "Subtask hook panicked"
                );
            }
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("task_hooks", &self.task_hooks.read().len())
            .field("subtask_hooks", &self.subtask_hooks.read().len())
            .finish()
    }
}
