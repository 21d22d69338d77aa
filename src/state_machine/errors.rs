use thiserror::Error;

/// Error types for execution state transitions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Execution {entity} is already terminal ({state})")]
    AlreadyTerminal { entity: String, state: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
