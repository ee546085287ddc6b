// State machines for task and subtask instances
//
// Transitions are pure functions over the in-memory instance records. Callers
// apply them while holding a task lock and persist the result on commit.

pub mod errors;
pub mod events;
pub mod guards;
pub mod states;
pub mod subtask_state_machine;
pub mod task_state_machine;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{SubtaskEvent, TaskEvent};
pub use states::{SubtaskOperation, SubtaskState, TaskOperation, TaskState};
pub use subtask_state_machine::SubtaskStateMachine;
pub use task_state_machine::TaskStateMachine;

pub use guards::StateGuard;
