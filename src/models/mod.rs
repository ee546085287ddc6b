//! # Instance Models
//!
//! Durable runtime records materialized from a
//! [`Template`](crate::template::Template) at submission time.
//!
//! A [`TaskInstance`] owns its [`SubtaskInstance`]s and is always loaded and
//! saved together with them: every mutation happens through a
//! [`TaskLock`](crate::persistence::TaskLock), so the task row, its subtask rows
//! and the materialized links are consistent with each other at every commit.
//!
//! Links between subtask instances are copied out of the template graph when
//! the task is created. Nothing done to a template afterwards reaches a
//! running instance.

pub mod subtask_instance;
pub mod task_instance;

pub use subtask_instance::{NewSubtaskInstance, SubtaskInstance};
pub use task_instance::{NewTaskInstance, TaskInstance};

pub use crate::state_machine::states::{SubtaskOperation, SubtaskState, TaskOperation, TaskState};
