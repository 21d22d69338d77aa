//! A store failing mid-run still leaves the job terminal.

mod common;

use async_trait::async_trait;
use common::key_copy_worker;
use partition_batch::constants::params;
use partition_batch::dispatch::LocalPoolDispatcher;
use partition_batch::error::{BatchError, BatchResult};
use partition_batch::events::EventPublisher;
use partition_batch::models::{JobExecution, JobParameters, StepExecution};
use partition_batch::orchestration::{JobCoordinator, JobDefinition};
use partition_batch::partition::{FixedKeySpace, PartitionRange};
use partition_batch::sample::TableWriter;
use partition_batch::state_machine::BatchStatus;
use partition_batch::store::{ExecutionStateStore, InMemoryExecutionStateStore};
use std::sync::Arc;

/// Delegating store that rejects step writes on demand
#[derive(Debug, Default)]
struct FailingStepStore {
    inner: InMemoryExecutionStateStore,
    fail_step_creates: bool,
    fail_step_updates: bool,
}

#[async_trait]
impl ExecutionStateStore for FailingStepStore {
    async fn create_job_execution(&self, job: JobExecution) -> BatchResult<JobExecution> {
        self.inner.create_job_execution(job).await
    }

    async fn update_job_execution(&self, job: &JobExecution) -> BatchResult<()> {
        self.inner.update_job_execution(job).await
    }

    async fn get_job_execution(&self, id: i64) -> BatchResult<Option<JobExecution>> {
        self.inner.get_job_execution(id).await
    }

    async fn find_job_execution(&self, job_name: &str, run_token: &str) -> BatchResult<Option<JobExecution>> {
        self.inner.find_job_execution(job_name, run_token).await
    }

    async fn find_job_executions_by_correlation(&self, correlation_token: &str) -> BatchResult<Vec<JobExecution>> {
        self.inner.find_job_executions_by_correlation(correlation_token).await
    }

    async fn create_step_execution(&self, step: StepExecution) -> BatchResult<StepExecution> {
        if self.fail_step_creates {
            return Err(BatchError::state_store("step table unavailable"));
        }
        self.inner.create_step_execution(step).await
    }

    async fn update_step_execution(&self, step: &StepExecution) -> BatchResult<()> {
        if self.fail_step_updates {
            return Err(BatchError::state_store("step table is read-only"));
        }
        self.inner.update_step_execution(step).await
    }

    async fn get_step_execution(&self, id: i64) -> BatchResult<Option<StepExecution>> {
        self.inner.get_step_execution(id).await
    }

    async fn find_step_executions(&self, job_execution_id: i64) -> BatchResult<Vec<StepExecution>> {
        self.inner.find_step_executions(job_execution_id).await
    }
}

fn coordinator(store: Arc<FailingStepStore>) -> JobCoordinator {
    let worker = key_copy_worker(Arc::new(TableWriter::new()), 2);
    let publisher = EventPublisher::default();
    let dispatcher = LocalPoolDispatcher::new(worker.clone(), store.clone(), publisher.clone());
    JobCoordinator::new(store, Arc::new(dispatcher), worker, publisher)
}

fn job() -> JobDefinition {
    JobDefinition::new("partitionJob", Arc::new(FixedKeySpace::from_extent(10))).with_grid_size(3)
}

#[tokio::test]
async fn master_step_create_failure_fails_the_job() {
    let store = Arc::new(FailingStepStore {
        fail_step_creates: true,
        ..FailingStepStore::default()
    });
    let coordinator = coordinator(store.clone());

    let error = coordinator
        .launch(&job(), JobParameters::with_run_token("run-1"))
        .await
        .unwrap_err();
    assert!(matches!(error, BatchError::StateStore(_)));

    let stored = store.find_job_execution("partitionJob", "run-1").await.unwrap().unwrap();
    assert_eq!(stored.status, BatchStatus::Failed);
    assert!(stored.exit_message.unwrap().contains("step table unavailable"));
    assert!(stored.ended_at.is_some());
}

#[tokio::test]
async fn master_step_update_failure_fails_the_job() {
    let store = Arc::new(FailingStepStore {
        fail_step_updates: true,
        ..FailingStepStore::default()
    });
    let coordinator = coordinator(store.clone());

    let result = coordinator.launch(&job(), JobParameters::with_run_token("run-2")).await;
    assert!(result.is_err());

    let stored = store.find_job_execution("partitionJob", "run-2").await.unwrap().unwrap();
    assert_eq!(stored.status, BatchStatus::Failed);
    assert!(stored.exit_message.unwrap().contains("read-only"));
}

#[tokio::test]
async fn partition_job_step_failure_fails_the_partition_job() {
    let store = Arc::new(FailingStepStore {
        fail_step_creates: true,
        ..FailingStepStore::default()
    });
    let coordinator = coordinator(store.clone());

    let result = coordinator
        .launch_partition(
            "partitionJob.worker",
            JobParameters::with_run_token("master-9:0").with(params::CORRELATION_TOKEN, "master-9"),
            PartitionRange::new(1, 4, 0),
        )
        .await;
    assert!(result.is_err());

    let stored = store
        .find_job_execution("partitionJob.worker", "master-9:0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, BatchStatus::Failed);
}

#[tokio::test]
async fn healthy_store_still_completes() {
    let store = Arc::new(FailingStepStore::default());
    let coordinator = coordinator(store.clone());

    let job = coordinator
        .launch(&job(), JobParameters::with_run_token("run-3"))
        .await
        .unwrap();

    assert_eq!(job.status, BatchStatus::Completed);
    assert_eq!(store.inner.step_count(), 4);
}
