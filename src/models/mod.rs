//! # Execution Models
//!
//! Records persisted by the execution state store: job executions, step executions
//! and the scalar maps they carry.

pub mod execution_context;
pub mod job_execution;
pub mod job_parameters;
pub mod scalar;
pub mod step_execution;

// Re-export core models for easy access
pub use execution_context::ExecutionContext;
pub use job_execution::JobExecution;
pub use job_parameters::JobParameters;
pub use scalar::{ScalarMap, ScalarValue};
pub use step_execution::StepExecution;
