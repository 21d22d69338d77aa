//! Error types for the partitioned batch system.
//!

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::state_machine::StateMachineError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    /// Raised before any dispatch: bad grid size, unavailable key space
    #[error("Planning error: {0}")]
    Planning(String),
    /// Transport failure while handing a partition to a worker
    #[error("Dispatch error for partition {partition:?}: {reason}")]
    Dispatch {
        partition: Option<u32>,
        reason: String,
    },
    #[error("Worker error in step {step_name}: {reason}")]
    Worker { step_name: String, reason: String },
    #[error("Correlation lost for run {run_token}: {missing} partition(s) never replied")]
    CorrelationLost { run_token: String, missing: usize },
    #[error("Job {job_name} already has an execution for run token {run_token}")]
    DuplicateRun { job_name: String, run_token: String },
    #[error("Execution state store error: {0}")]
    StateStore(String),
    #[error("State machine error: {0}")]
    StateMachine(String),
    #[error("Messaging error: {0}")]
    Messaging(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BatchError {
    pub fn planning(reason: impl Into<String>) -> Self {
        Self::Planning(reason.into())
    }

    pub fn dispatch(partition: Option<u32>, reason: impl Into<String>) -> Self {
        Self::Dispatch {
            partition,
            reason: reason.into(),
        }
    }

    pub fn worker(step_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Worker {
            step_name: step_name.into(),
            reason: reason.into(),
        }
    }

    pub fn state_store(reason: impl Into<String>) -> Self {
        Self::StateStore(reason.into())
    }

    /// Errors that abort a job before any partition reached a worker
    pub fn is_planning(&self) -> bool {
        matches!(self, Self::Planning(_))
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(error: serde_json::Error) -> Self {
        BatchError::Serialization(error.to_string())
    }
}

impl From<MessagingError> for BatchError {
    fn from(error: MessagingError) -> Self {
        BatchError::Messaging(error.to_string())
    }
}

impl From<StateMachineError> for BatchError {
    fn from(error: StateMachineError) -> Self {
        BatchError::StateMachine(error.to_string())
    }
}

impl From<ConfigurationError> for BatchError {
    fn from(error: ConfigurationError) -> Self {
        BatchError::Configuration(error.to_string())
    }
}

pub type BatchResult<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_display() {
        let error = BatchError::dispatch(Some(2), "channel closed");
        assert_eq!(
            error.to_string(),
            "Dispatch error for partition Some(2): channel closed"
        );
    }

    #[test]
    fn test_planning_classification() {
        assert!(BatchError::planning("grid size must be at least 1").is_planning());
        assert!(!BatchError::state_store("missing").is_planning());
    }
}
