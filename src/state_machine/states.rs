use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a task instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Subtasks are being scheduled
    Running,
    /// A subtask failed and no forward progress is possible without an operator
    Failed,
    /// Every subtask finished (or, under rollback, was undone)
    Successful,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Successful)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Failed => write!(f, "FAILED"),
            Self::Successful => write!(f, "SUCCESSFUL"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "FAILED" => Ok(Self::Failed),
            "SUCCESSFUL" => Ok(Self::Successful),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Running
    }
}

/// Direction in which a task is currently driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskOperation {
    Execute,
    Retry,
    Rollback,
}

impl TaskOperation {
    /// Rollback walks the graph against its edges
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback)
    }
}

impl fmt::Display for TaskOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute => write!(f, "EXECUTE"),
            Self::Retry => write!(f, "RETRY"),
            Self::Rollback => write!(f, "ROLLBACK"),
        }
    }
}

impl std::str::FromStr for TaskOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXECUTE" => Ok(Self::Execute),
            "RETRY" => Ok(Self::Retry),
            "ROLLBACK" => Ok(Self::Rollback),
            _ => Err(format!("Invalid task operation: {s}")),
        }
    }
}

impl Default for TaskOperation {
    fn default() -> Self {
        Self::Execute
    }
}

/// Lifecycle of a subtask instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubtaskState {
    /// Waiting for its dependencies
    Pending,
    /// Eligible for dispatch
    Ready,
    /// Dispatched to the runner
    Running,
    /// Cancellation requested, waiting for the invocation to return
    Canceling,
    Failed,
    Successful,
}

impl SubtaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Successful)
    }

    /// Dispatched or about to be; counts against the per-task ceiling
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Ready | Self::Running | Self::Canceling)
    }

    /// An invocation may still be executing
    pub fn is_executing(&self) -> bool {
        matches!(self, Self::Running | Self::Canceling)
    }
}

impl fmt::Display for SubtaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Ready => write!(f, "READY"),
            Self::Running => write!(f, "RUNNING"),
            Self::Canceling => write!(f, "CANCELING"),
            Self::Failed => write!(f, "FAILED"),
            Self::Successful => write!(f, "SUCCESSFUL"),
        }
    }
}

impl std::str::FromStr for SubtaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "READY" => Ok(Self::Ready),
            "RUNNING" => Ok(Self::Running),
            "CANCELING" => Ok(Self::Canceling),
            "FAILED" => Ok(Self::Failed),
            "SUCCESSFUL" => Ok(Self::Successful),
            _ => Err(format!("Invalid subtask state: {s}")),
        }
    }
}

impl Default for SubtaskState {
    fn default() -> Self {
        Self::Pending
    }
}

/// What the next (or last) dispatch of a subtask instance does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubtaskOperation {
    Execute,
    Retry,
    Rollback,
    /// Resolve a failed instance without running it again
    Skip,
    /// Resolve a failed rollback without running it again
    RollbackSkip,
    Cancel,
}

impl SubtaskOperation {
    /// Operations resolved by the engine without invoking the subtask
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip | Self::RollbackSkip)
    }

    /// A successful instance with this operation has been undone
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback | Self::RollbackSkip)
    }
}

impl fmt::Display for SubtaskOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute => write!(f, "EXECUTE"),
            Self::Retry => write!(f, "RETRY"),
            Self::Rollback => write!(f, "ROLLBACK"),
            Self::Skip => write!(f, "SKIP"),
            Self::RollbackSkip => write!(f, "ROLLBACK_SKIP"),
            Self::Cancel => write!(f, "CANCEL"),
        }
    }
}

impl std::str::FromStr for SubtaskOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXECUTE" => Ok(Self::Execute),
            "RETRY" => Ok(Self::Retry),
            "ROLLBACK" => Ok(Self::Rollback),
            "SKIP" => Ok(Self::Skip),
            "ROLLBACK_SKIP" => Ok(Self::RollbackSkip),
            "CANCEL" => Ok(Self::Cancel),
            _ => Err(format!("Invalid subtask operation: {s}")),
        }
    }
}

impl Default for SubtaskOperation {
    fn default() -> Self {
        Self::Execute
    }
}
