use super::states::{SubtaskOperation, TaskOperation};
use serde::{Deserialize, Serialize};

/// Events that drive task state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// Every subtask resolved in the task's current direction
    Complete,
    /// A subtask failed and nothing else is in flight
    Fail,
    /// An operator action makes the task schedulable again
    Resume(TaskOperation),
}

impl TaskEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Resume(_) => "resume",
        }
    }
}

/// Events that drive subtask instance state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SubtaskEvent {
    /// Make the instance eligible for dispatch with the given operation
    Enqueue {
        operation: SubtaskOperation,
        manual: bool,
    },
    /// Hand the instance to the runner
    Start,
    /// Invocation returned successfully, or a skip was resolved
    Complete,
    /// Invocation failed, timed out, was canceled or could not be dispatched
    Fail(String),
    /// Operator asked a running invocation to stop
    RequestCancel,
    /// Return a never-dispatched instance to PENDING
    Reset,
}

impl SubtaskEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Enqueue { .. } => "enqueue",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::RequestCancel => "request_cancel",
            Self::Reset => "reset",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }

    pub fn enqueue(operation: SubtaskOperation) -> Self {
        Self::Enqueue {
            operation,
            manual: false,
        }
    }

    pub fn enqueue_manual(operation: SubtaskOperation) -> Self {
        Self::Enqueue {
            operation,
            manual: true,
        }
    }
}
