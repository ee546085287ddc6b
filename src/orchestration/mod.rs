//! # Orchestration
//!
//! Scheduling side of the engine. The [`TaskCoordinator`] and the
//! [`SubtaskCoordinator`] each own a group of fixed-delay polling loops
//! ([`polling`]). Their workers ([`workers`]) read candidates from the
//! [`TaskStore`](crate::persistence::TaskStore), re-check them under the task
//! lock and apply state-machine transitions. Subtask bodies are invoked only
//! by the [`Runner`](runner::Runner), on slots taken from the
//! [`ExecutorPools`](executor_pool::ExecutorPools).
//!
//! [`TaskEngine`] wires all of it together.

pub mod bootstrap;
pub mod core;
pub mod executor_pool;
pub mod hooks;
pub mod polling;
pub mod runner;
pub mod subtask_coordinator;
pub mod task_coordinator;
pub mod task_finalizer;
pub mod task_initializer;
pub mod viable_subtask_discovery;
pub mod workers;

pub use self::core::OrchestrationCore;
pub use bootstrap::{TaskEngine, TaskEngineBuilder};
pub use executor_pool::ExecutorPools;
pub use hooks::{Hooks, SubtaskHook, TaskHook};
pub use polling::{CycleReport, ItemOutcome, LoopControl, PollingLoop, PollingWorker, WorkerGroup};
pub use runner::{Execution, ExecutionRegistry, ExecutionResult, Invocation, Runner};
pub use subtask_coordinator::SubtaskCoordinator;
pub use task_coordinator::TaskCoordinator;
pub use task_finalizer::{TaskFinalizer, TaskOutcome};
pub use task_initializer::TaskInitializer;
