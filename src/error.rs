//! Error types for the task engine.
//!
//! Errors fall into four families: structural errors raised while a
//! [`Template`](crate::template::Template) is assembled, precondition errors
//! raised by the operator API, the prohibited-rollback error, and
//! infrastructure errors (storage, configuration, serialization). Failures of
//! subtask bodies are not represented here; they are captured on the
//! [`SubtaskInstance`](crate::models::SubtaskInstance) that produced them.

use crate::models::{SubtaskState, TaskOperation, TaskState};
use crate::state_machine::StateMachineError;
use crate::template::TemplateError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskEngineError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Task {task_id} is in state {current_state}, expected {expected_state}")]
    InvalidTaskState {
        task_id: i64,
        current_state: TaskState,
        expected_state: TaskState,
    },

    #[error("Subtask {subtask_id} is in state {current_state}, expected {expected_state}")]
    InvalidSubtaskState {
        subtask_id: i64,
        current_state: SubtaskState,
        expected_state: SubtaskState,
    },

    #[error("Task {task_id} operation {operation} does not allow {requested}")]
    InvalidTaskOperation {
        task_id: i64,
        operation: TaskOperation,
        requested: String,
    },

    #[error("Task {task_id} still has {count} subtasks in flight")]
    SubtasksInFlight { task_id: i64, count: usize },

    #[error("Rollback prohibited for task {task_id}: {reason}")]
    RollbackProhibited { task_id: i64, reason: String },

    #[error("Task {0} not found")]
    TaskNotFound(i64),

    #[error("Subtask {0} not found")]
    SubtaskNotFound(i64),

    #[error("No subtask registered for kind '{0}'")]
    SubtaskNotRegistered(String),

    #[error("Invalid context: {0}")]
    InvalidContext(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("State machine error: {0}")]
    StateMachine(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaskEngineError {
    /// Whether repeating the same request could succeed without an operator
    /// changing anything first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::Internal(_))
    }

    /// Precondition failures leave persisted state untouched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidTaskState { .. }
                | Self::InvalidSubtaskState { .. }
                | Self::InvalidTaskOperation { .. }
                | Self::SubtasksInFlight { .. }
                | Self::RollbackProhibited { .. }
        )
    }
}

impl From<serde_json::Error> for TaskEngineError {
    fn from(error: serde_json::Error) -> Self {
        TaskEngineError::Serialization(error.to_string())
    }
}

impl From<sqlx::Error> for TaskEngineError {
    fn from(err: sqlx::Error) -> Self {
        TaskEngineError::DatabaseError(err.to_string())
    }
}

impl From<config::ConfigError> for TaskEngineError {
    fn from(err: config::ConfigError) -> Self {
        TaskEngineError::ConfigurationError(err.to_string())
    }
}

impl From<StateMachineError> for TaskEngineError {
    fn from(err: StateMachineError) -> Self {
        TaskEngineError::StateMachine(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaskEngineError>;
