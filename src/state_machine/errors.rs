use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
