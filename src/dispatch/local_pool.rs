//! # Local Pool Dispatch
//!
//! Runs every partition as a tokio task in this process. A semaphore bounds how many
//! run at once; the master blocks until all of them reach a terminal status.
//!
//! A worker task that panics or outlives the configured partition timeout only fails
//! its own partition.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};

use super::{DispatchRequest, DispatchStrategy, ExecutionOutcome, PartitionDispatcher};
use crate::config::LocalPoolConfig;
use crate::constants::events;
use crate::error::{BatchError, BatchResult};
use crate::events::EventPublisher;
use crate::logging::log_dispatch_operation;
use crate::models::StepExecution;
use crate::orchestration::worker::{execute_partition_step, fail_unfinished_step, PartitionWorker};
use crate::store::ExecutionStateStore;

#[derive(Debug, Clone)]
pub struct LocalPoolDispatcher {
    worker: Arc<dyn PartitionWorker>,
    store: Arc<dyn ExecutionStateStore>,
    publisher: EventPublisher,
    max_concurrency: Option<usize>,
    partition_timeout: Option<Duration>,
}

impl LocalPoolDispatcher {
    pub fn new(
        worker: Arc<dyn PartitionWorker>,
        store: Arc<dyn ExecutionStateStore>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            worker,
            store,
            publisher,
            max_concurrency: None,
            partition_timeout: None,
        }
    }

    pub fn from_config(
        config: &LocalPoolConfig,
        worker: Arc<dyn PartitionWorker>,
        store: Arc<dyn ExecutionStateStore>,
        publisher: EventPublisher,
    ) -> Self {
        let mut dispatcher = Self::new(worker, store, publisher);
        dispatcher.max_concurrency = config.max_concurrency;
        dispatcher.partition_timeout = config.partition_timeout();
        dispatcher
    }

    /// Cap the number of partitions running at once
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency.max(1));
        self
    }

    /// Fail partitions that run longer than `timeout`
    pub fn with_partition_timeout(mut self, timeout: Duration) -> Self {
        self.partition_timeout = Some(timeout);
        self
    }

    async fn run_one(
        worker: Arc<dyn PartitionWorker>,
        store: Arc<dyn ExecutionStateStore>,
        publisher: EventPublisher,
        semaphore: Arc<Semaphore>,
        partition_timeout: Option<Duration>,
        step: StepExecution,
    ) -> BatchResult<StepExecution> {
        let _permit = semaphore.acquire_owned().await.map_err(|e| {
            BatchError::dispatch(step.partition_number(), format!("worker pool closed: {e}"))
        })?;

        let execution = execute_partition_step(worker.as_ref(), store.as_ref(), &publisher, step.clone());
        match partition_timeout {
            None => execution.await,
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(result) => result,
                Err(_) => Ok(fail_unfinished_step(
                    store.as_ref(),
                    &publisher,
                    step,
                    format!("Partition timed out after {}ms", limit.as_millis()),
                )
                .await),
            },
        }
    }
}

#[async_trait]
impl PartitionDispatcher for LocalPoolDispatcher {
    #[instrument(skip_all, fields(job = %request.job.job_name, run_token = %request.job.run_token, partitions = request.partitions.len()))]
    async fn dispatch(&self, request: DispatchRequest) -> BatchResult<ExecutionOutcome> {
        if request.partitions.is_empty() {
            return Ok(ExecutionOutcome::Collected(Vec::new()));
        }

        let started = Instant::now();
        let step_name = request.worker_step_name();
        let pool_size = self
            .max_concurrency
            .unwrap_or(request.partitions.len())
            .min(request.partitions.len())
            .max(1);
        let semaphore = Arc::new(Semaphore::new(pool_size));

        debug!(pool_size = pool_size, "🧵 LOCAL_POOL: Spawning partition tasks");

        // Every step execution exists before any worker starts
        let mut steps = Vec::with_capacity(request.partitions.len());
        for range in &request.partitions {
            steps.push(
                self.store
                    .create_step_execution(StepExecution::for_partition(
                        request.job.id,
                        &step_name,
                        range,
                    ))
                    .await?,
            );
        }

        let mut snapshots = Vec::with_capacity(steps.len());
        let mut handles = Vec::with_capacity(steps.len());
        for step in steps {
            self.publisher.publish(
                events::PARTITION_DISPATCHED,
                json!({
                    "strategy": DispatchStrategy::Local,
                    "job_execution_id": request.job.id,
                    "step_execution_id": step.id,
                    "partition_number": step.partition_number(),
                }),
            );

            handles.push(tokio::spawn(Self::run_one(
                Arc::clone(&self.worker),
                Arc::clone(&self.store),
                self.publisher.clone(),
                Arc::clone(&semaphore),
                self.partition_timeout,
                step.clone(),
            )));
            snapshots.push(step);
        }

        let joined = join_all(handles).await;
        let mut results = Vec::with_capacity(joined.len());
        for (snapshot, outcome) in snapshots.into_iter().zip(joined) {
            let finished = match outcome {
                Ok(Ok(step)) => step,
                Ok(Err(e)) => {
                    error!(step_id = snapshot.id, error = %e, "❌ LOCAL_POOL: Partition bookkeeping failed");
                    fail_unfinished_step(self.store.as_ref(), &self.publisher, snapshot, e.to_string()).await
                }
                Err(join_error) => {
                    error!(step_id = snapshot.id, error = %join_error, "💥 LOCAL_POOL: Partition task panicked");
                    fail_unfinished_step(
                        self.store.as_ref(),
                        &self.publisher,
                        snapshot,
                        format!("Worker task panicked: {join_error}"),
                    )
                    .await
                }
            };
            results.push(finished);
        }

        results.sort_by_key(|step| step.partition_number());
        let outcome = ExecutionOutcome::Collected(results);

        log_dispatch_operation(
            "collect",
            "local",
            &request.job.run_token,
            outcome.partition_count(),
            &outcome.aggregate_status().to_string(),
            Some(started.elapsed().as_millis() as u64),
        );
        info!(
            failed = outcome.failed_partitions().len(),
            "🏁 LOCAL_POOL: All partitions finished"
        );

        Ok(outcome)
    }

    fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::Local
    }
}
