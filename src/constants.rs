//! # Engine Constants
//!
//! Default scheduling parameters and well-known context keys shared by the
//! coordinators, the instance managers and the configuration layer.

/// Well-known keys stored in a task [`Context`](crate::context::Context)
pub mod context_keys {
    /// Set to `"true"` when the whole task must never be rolled back
    pub const PROHIBIT_ROLLBACK: &str = "prohibit_rollback";
}

/// Default coordinator and executor settings
pub mod defaults {
    /// Delay before the first poll of every worker after startup
    pub const INITIAL_DELAY_MS: u64 = 60_000;
    /// Fixed delay between the end of one poll cycle and the start of the next
    pub const POLL_INTERVAL_MS: u64 = 1_000;
    /// Maximum subtasks of a single task that may be READY/RUNNING at once
    pub const TASK_CONCURRENCY: usize = 10;
    /// Execution slots for automatically scheduled subtasks
    pub const AUTO_POOL_SIZE: usize = 16;
    /// Execution slots reserved for operator-triggered subtasks
    pub const MANUAL_POOL_SIZE: usize = 4;
    /// Database connection pool size
    pub const DATABASE_MAX_CONNECTIONS: u32 = 10;
    /// Grace period for polling loops to exit on shutdown
    pub const SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
}

/// Names used for polling workers in logs and metrics
pub mod workers {
    pub const READY_TASK: &str = "ready_task_worker";
    pub const RUNNING_TASK: &str = "running_task_worker";
    pub const READY_SUBTASK: &str = "ready_subtask_worker";
    pub const RUNNING_SUBTASK: &str = "running_subtask_worker";
    pub const CANCELING_SUBTASK: &str = "canceling_subtask_worker";
    pub const FAILED_SUBTASK: &str = "failed_subtask_worker";
}

/// Messages recorded on instances failed by the engine itself
pub mod failure_messages {
    pub const EXECUTION_LOST: &str = "execution handle lost";
    pub const CANCELED: &str = "canceled by operator";
}
