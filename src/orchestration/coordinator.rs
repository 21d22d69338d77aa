//! # Job Coordinator
//!
//! Drives one job execution from STARTING to a terminal status:
//!
//! 1. Create the job execution; a reused `(job_name, run_token)` is rejected with
//!    [`BatchError::DuplicateRun`] before anything is written.
//! 2. Start the job and its master step.
//! 3. Plan: ask the job's key-space provider for bounds and cut them into ranges.
//! 4. Dispatch the non-empty ranges through the configured [`PartitionDispatcher`].
//! 5. Aggregate the outcome onto the master step and the job.
//!
//! The job is COMPLETED only when every collected partition completed. Planning and
//! dispatch errors fail the job rather than escaping to the caller.
//!
//! ## Broker strategy
//!
//! A [`ExecutionOutcome::Dispatched`] outcome carries no partition results, so a broker
//! job reports COMPLETED as soon as publishing succeeds. That status means
//! "dispatch completed", not "work completed"; use
//! [`CompletionTracker`](super::CompletionTracker) to follow the partition jobs.

use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::job::JobDefinition;
use super::worker::{execute_partition_step, PartitionWorker};
use crate::constants::{events, worker_step_name};
use crate::dispatch::{DispatchRequest, ExecutionOutcome, PartitionDispatcher};
use crate::error::{BatchError, BatchResult};
use crate::events::EventPublisher;
use crate::logging::{log_error, log_job_operation, log_step_operation};
use crate::models::{ExecutionContext, JobExecution, JobParameters, StepExecution};
use crate::partition::{partition_key_space, PartitionRange, PartitionSet};
use crate::state_machine::{BatchStatus, LifecycleEvent};
use crate::store::ExecutionStateStore;

#[derive(Debug, Clone)]
pub struct JobCoordinator {
    store: Arc<dyn ExecutionStateStore>,
    dispatcher: Arc<dyn PartitionDispatcher>,
    worker: Arc<dyn PartitionWorker>,
    publisher: EventPublisher,
}

impl JobCoordinator {
    pub fn new(
        store: Arc<dyn ExecutionStateStore>,
        dispatcher: Arc<dyn PartitionDispatcher>,
        worker: Arc<dyn PartitionWorker>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            store,
            dispatcher,
            worker,
            publisher,
        }
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStateStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<dyn PartitionDispatcher> {
        &self.dispatcher
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Create and run a job execution for `parameters`
    ///
    /// `Err` means no run happened (duplicate identity, missing run token) or the
    /// store failed; a job that ran and failed comes back as `Ok` with status FAILED.
    #[instrument(skip_all, fields(job = %job.name()))]
    pub async fn launch(&self, job: &JobDefinition, parameters: JobParameters) -> BatchResult<JobExecution> {
        let execution = self.create_execution(job.name(), parameters).await?;
        self.execute(job, execution).await
    }

    /// Run an already persisted job execution to a terminal status
    ///
    /// Once the job is STARTED it always leaves this call terminal: a store or
    /// transition error fails the job before the error is returned.
    #[instrument(skip_all, fields(job = %definition.name(), job_execution_id = job.id, run_token = %job.run_token))]
    pub async fn execute(&self, definition: &JobDefinition, mut job: JobExecution) -> BatchResult<JobExecution> {
        self.start_job(&mut job).await?;

        match self.run_master_step(definition, &job).await {
            Ok(event) => {
                self.finish_job(&mut job, event).await?;
                Ok(job)
            }
            Err(e) => {
                self.abort_job(&mut job, &e, "run_master_step").await;
                Err(e)
            }
        }
    }

    /// Run a single partition as its own job execution
    ///
    /// Used by the broker consumer: the job parameters carry the partition's run token
    /// and the master's run token as correlation token.
    #[instrument(skip_all, fields(job = %job_name, partition = range.index))]
    pub async fn launch_partition(
        &self,
        job_name: &str,
        parameters: JobParameters,
        range: PartitionRange,
    ) -> BatchResult<JobExecution> {
        let mut job = self.create_execution(job_name, parameters).await?;
        self.start_job(&mut job).await?;

        let step = match self
            .store
            .create_step_execution(StepExecution::for_partition(
                job.id,
                &worker_step_name(job_name),
                &range,
            ))
            .await
        {
            Ok(step) => step,
            Err(e) => {
                self.abort_job(&mut job, &e, "create_partition_step").await;
                return Err(e);
            }
        };

        let event = match execute_partition_step(self.worker.as_ref(), self.store.as_ref(), &self.publisher, step).await {
            Ok(step) if step.status == BatchStatus::Completed => LifecycleEvent::Complete,
            Ok(step) => LifecycleEvent::fail_with_error(
                step.exit_message
                    .unwrap_or_else(|| format!("Partition {} failed", range.index)),
            ),
            Err(e) => LifecycleEvent::fail_with_error(e.to_string()),
        };

        self.finish_job(&mut job, event).await?;
        Ok(job)
    }

    /// Create the master step, plan and dispatch, and settle the master step
    ///
    /// Returns the event that finishes the job. Planning and dispatch errors become a
    /// failure event; store and transition errors are returned as `Err`.
    async fn run_master_step(&self, definition: &JobDefinition, job: &JobExecution) -> BatchResult<LifecycleEvent> {
        let mut master = self
            .store
            .create_step_execution(StepExecution::new(
                job.id,
                definition.master_step_name(),
                ExecutionContext::new(),
            ))
            .await?;

        match self.settle_master_step(definition, job, &mut master).await {
            Ok(event) => Ok(event),
            Err(e) => {
                if !master.status.is_terminal() {
                    if let Err(transition_error) = master.transition(LifecycleEvent::fail_with_error(e.to_string())) {
                        warn!(step_id = master.id, error = %transition_error, "⚠️ COORDINATOR: Could not fail master step");
                    } else if let Err(store_error) = self.store.update_step_execution(&master).await {
                        warn!(step_id = master.id, error = %store_error, "⚠️ COORDINATOR: Could not persist failed master step");
                    }
                }
                Err(e)
            }
        }
    }

    async fn settle_master_step(
        &self,
        definition: &JobDefinition,
        job: &JobExecution,
        master: &mut StepExecution,
    ) -> BatchResult<LifecycleEvent> {
        master.transition(LifecycleEvent::Start)?;
        self.store.update_step_execution(master).await?;
        log_step_operation(
            "start",
            Some(job.id),
            Some(master.id),
            Some(&master.step_name),
            &master.status.to_string(),
            None,
        );

        let result = match self.plan(definition).await {
            Ok(plan) => {
                master.context.put(crate::constants::context_keys::GRID_SIZE, plan.grid_size);
                master
                    .context
                    .put(crate::constants::context_keys::PARTITION_COUNT, plan.dispatchable().len() as i64);
                if plan.empty_count() > 0 {
                    info!(
                        empty = plan.empty_count(),
                        "📭 COORDINATOR: Skipping empty partitions"
                    );
                }
                self.dispatch(job, master, plan).await
            }
            Err(e) => Err(e),
        };

        let master_event = match &result {
            Ok(outcome) => {
                if let ExecutionOutcome::Dispatched { destination, published, .. } = outcome {
                    warn!(
                        destination = %destination,
                        published = published,
                        "📣 COORDINATOR: Broker job reports dispatch completion only; partition work is tracked separately"
                    );
                }
                match outcome.aggregate_status() {
                    BatchStatus::Completed => LifecycleEvent::Complete,
                    _ => LifecycleEvent::fail_with_error(describe_failures(outcome)),
                }
            }
            Err(e) => {
                log_error("coordinator", "plan_and_dispatch", &e.to_string(), Some(&job.job_name));
                LifecycleEvent::fail_with_error(e.to_string())
            }
        };

        master.transition(master_event.clone())?;
        self.store.update_step_execution(master).await?;
        log_step_operation(
            "finish",
            Some(job.id),
            Some(master.id),
            Some(&master.step_name),
            &master.status.to_string(),
            master.exit_message.as_deref(),
        );
        Ok(master_event)
    }

    /// Fail a started job after `error`; secondary failures are only logged
    async fn abort_job(&self, job: &mut JobExecution, error: &BatchError, operation: &str) {
        log_error("coordinator", operation, &error.to_string(), Some(&job.job_name));
        if job.status.is_terminal() {
            return;
        }
        if let Err(e) = self
            .finish_job(job, LifecycleEvent::fail_with_error(error.to_string()))
            .await
        {
            error!(job_execution_id = job.id, error = %e, "❌ COORDINATOR: Could not fail job after error");
        }
    }

    async fn create_execution(&self, job_name: &str, parameters: JobParameters) -> BatchResult<JobExecution> {
        let run_token = parameters
            .run_token()
            .ok_or_else(|| BatchError::planning("job parameters carry no run token"))?;

        let job = self
            .store
            .create_job_execution(JobExecution::new(job_name, run_token, parameters))
            .await?;

        log_job_operation(
            "create",
            Some(job.id),
            Some(&job.job_name),
            Some(&job.run_token),
            &job.status.to_string(),
            None,
        );
        Ok(job)
    }

    async fn start_job(&self, job: &mut JobExecution) -> BatchResult<()> {
        job.transition(LifecycleEvent::Start)?;
        self.store.update_job_execution(job).await?;

        self.publisher.publish(
            events::JOB_STARTED,
            json!({
                "job_execution_id": job.id,
                "job_name": job.job_name,
                "run_token": job.run_token,
            }),
        );
        log_job_operation(
            "start",
            Some(job.id),
            Some(&job.job_name),
            Some(&job.run_token),
            &job.status.to_string(),
            None,
        );
        Ok(())
    }

    async fn finish_job(&self, job: &mut JobExecution, event: LifecycleEvent) -> BatchResult<()> {
        job.transition(event)?;
        self.store.update_job_execution(job).await?;

        let name = if job.status == BatchStatus::Completed {
            events::JOB_COMPLETED
        } else {
            events::JOB_FAILED
        };
        self.publisher.publish(
            name,
            json!({
                "job_execution_id": job.id,
                "job_name": job.job_name,
                "run_token": job.run_token,
                "status": job.status,
                "exit_message": job.exit_message,
                "duration_ms": job.duration_ms(),
            }),
        );
        log_job_operation(
            "finish",
            Some(job.id),
            Some(&job.job_name),
            Some(&job.run_token),
            &job.status.to_string(),
            job.exit_message.as_deref(),
        );
        Ok(())
    }

    async fn plan(&self, definition: &JobDefinition) -> BatchResult<PartitionSet> {
        let key_space = definition
            .key_space()
            .key_space()
            .await
            .map_err(|e| BatchError::planning(format!("key space unavailable: {e:#}")))?;

        let plan = partition_key_space(key_space, definition.grid_size())?;
        info!(
            min_key = key_space.min_key,
            max_key = key_space.max_key,
            grid_size = plan.grid_size,
            dispatchable = plan.len() - plan.empty_count(),
            "🗺️ COORDINATOR: Partition plan ready"
        );
        Ok(plan)
    }

    async fn dispatch(
        &self,
        job: &JobExecution,
        master: &StepExecution,
        plan: PartitionSet,
    ) -> BatchResult<ExecutionOutcome> {
        let partitions = plan.dispatchable();
        if partitions.is_empty() {
            info!("📭 COORDINATOR: No non-empty partitions, nothing to dispatch");
            return Ok(ExecutionOutcome::Collected(Vec::new()));
        }

        self.dispatcher
            .dispatch(DispatchRequest {
                job: job.clone(),
                master_step: master.clone(),
                partitions,
            })
            .await
    }
}

/// Exit message for a master step whose partitions did not all complete
fn describe_failures(outcome: &ExecutionOutcome) -> String {
    let failed = outcome.failed_partitions();
    let detail = failed
        .iter()
        .map(|step| {
            format!(
                "{}: {}",
                step.step_name,
                step.exit_message.as_deref().unwrap_or("no exit message")
            )
        })
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "{} of {} partitions failed ({detail})",
        failed.len(),
        outcome.partition_count()
    )
}
