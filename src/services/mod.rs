//! # Instance Managers
//!
//! Operator-facing mutations of task and subtask instances. Every operation
//! takes the task lock, checks its preconditions with
//! [`StateGuard`](crate::state_machine::StateGuard)s, applies the transitions
//! and commits. A rejected request leaves the stored instance untouched.

pub mod subtask_instance_manager;
pub mod task_instance_manager;

pub use subtask_instance_manager::SubtaskInstanceManager;
pub use task_instance_manager::TaskInstanceManager;
