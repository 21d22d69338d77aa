//! # Execution State Store
//!
//! Persistence seam for job and step executions. The coordinator, dispatchers and
//! workers all receive the store by injection; nothing reaches for a global.
//!
//! Implementations must allow concurrent, independent writes to different step
//! executions, since every partition worker updates its own record in parallel.
//!
//! ```rust
//! use partition_batch::models::{JobExecution, JobParameters};
//! use partition_batch::store::{ExecutionStateStore, InMemoryExecutionStateStore};
//! use partition_batch::BatchError;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryExecutionStateStore::new();
//! let parameters = JobParameters::with_run_token(42_i64);
//!
//! let job = store
//!     .create_job_execution(JobExecution::new("partitionJob", "42", parameters.clone()))
//!     .await
//!     .unwrap();
//! assert!(job.id > 0);
//!
//! // The same identity cannot be launched twice
//! let again = store
//!     .create_job_execution(JobExecution::new("partitionJob", "42", parameters))
//!     .await;
//! assert!(matches!(again, Err(BatchError::DuplicateRun { .. })));
//! # });
//! ```

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::BatchResult;
use crate::models::{JobExecution, StepExecution};

pub mod in_memory;

pub use in_memory::InMemoryExecutionStateStore;

#[async_trait]
pub trait ExecutionStateStore: Send + Sync + Debug {
    /// Persist a new job execution and assign its id
    ///
    /// Fails with [`crate::BatchError::DuplicateRun`] when an execution with the same
    /// `(job_name, run_token)` already exists; nothing is created in that case.
    async fn create_job_execution(&self, job: JobExecution) -> BatchResult<JobExecution>;

    /// Write status, timestamps and exit message of an existing job execution
    ///
    /// The store owns the list of step execution ids; the caller's copy is ignored.
    async fn update_job_execution(&self, job: &JobExecution) -> BatchResult<()>;

    async fn get_job_execution(&self, id: i64) -> BatchResult<Option<JobExecution>>;

    async fn find_job_execution(
        &self,
        job_name: &str,
        run_token: &str,
    ) -> BatchResult<Option<JobExecution>>;

    /// Job executions whose parameters carry the given correlation token
    async fn find_job_executions_by_correlation(
        &self,
        correlation_token: &str,
    ) -> BatchResult<Vec<JobExecution>>;

    /// Persist a new step execution, assign its id and attach it to its job
    async fn create_step_execution(&self, step: StepExecution) -> BatchResult<StepExecution>;

    /// Overwrite a step execution; a step that is already terminal cannot be written again
    async fn update_step_execution(&self, step: &StepExecution) -> BatchResult<()>;

    async fn get_step_execution(&self, id: i64) -> BatchResult<Option<StepExecution>>;

    /// Step executions of a job, ordered by id
    async fn find_step_executions(&self, job_execution_id: i64) -> BatchResult<Vec<StepExecution>>;
}
