//! # In-Memory Execution State Store
//!
//! DashMap-backed store used by tests, the CLI and single-process deployments.
//! Sharded maps let partition workers update their step executions without contending
//! on one lock.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use super::ExecutionStateStore;
use crate::error::{BatchError, BatchResult};
use crate::models::{JobExecution, StepExecution};

#[derive(Debug)]
pub struct InMemoryExecutionStateStore {
    jobs: DashMap<i64, JobExecution>,
    identities: DashMap<(String, String), i64>,
    steps: DashMap<i64, StepExecution>,
    next_job_id: AtomicI64,
    next_step_id: AtomicI64,
}

impl InMemoryExecutionStateStore {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            identities: DashMap::new(),
            steps: DashMap::new(),
            next_job_id: AtomicI64::new(1),
            next_step_id: AtomicI64::new(1),
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

impl Default for InMemoryExecutionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStateStore for InMemoryExecutionStateStore {
    async fn create_job_execution(&self, mut job: JobExecution) -> BatchResult<JobExecution> {
        let identity = (job.job_name.clone(), job.run_token.clone());

        match self.identities.entry(identity) {
            Entry::Occupied(_) => Err(BatchError::DuplicateRun {
                job_name: job.job_name,
                run_token: job.run_token,
            }),
            Entry::Vacant(slot) => {
                job.id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
                slot.insert(job.id);
                self.jobs.insert(job.id, job.clone());
                Ok(job)
            }
        }
    }

    async fn update_job_execution(&self, job: &JobExecution) -> BatchResult<()> {
        let mut stored = self.jobs.get_mut(&job.id).ok_or_else(|| {
            BatchError::state_store(format!("job execution {} does not exist", job.id))
        })?;

        if stored.status.is_terminal() {
            return Err(BatchError::state_store(format!(
                "job execution {} is already {}",
                job.id, stored.status
            )));
        }

        let step_execution_ids = std::mem::take(&mut stored.step_execution_ids);
        *stored = job.clone();
        stored.step_execution_ids = step_execution_ids;
        Ok(())
    }

    async fn get_job_execution(&self, id: i64) -> BatchResult<Option<JobExecution>> {
        Ok(self.jobs.get(&id).map(|job| job.clone()))
    }

    async fn find_job_execution(
        &self,
        job_name: &str,
        run_token: &str,
    ) -> BatchResult<Option<JobExecution>> {
        let id = self
            .identities
            .get(&(job_name.to_string(), run_token.to_string()))
            .map(|id| *id);

        Ok(id.and_then(|id| self.jobs.get(&id).map(|job| job.clone())))
    }

    async fn find_job_executions_by_correlation(
        &self,
        correlation_token: &str,
    ) -> BatchResult<Vec<JobExecution>> {
        let mut jobs: Vec<JobExecution> = self
            .jobs
            .iter()
            .filter(|job| job.parameters.correlation_token().as_deref() == Some(correlation_token))
            .map(|job| job.clone())
            .collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn create_step_execution(&self, mut step: StepExecution) -> BatchResult<StepExecution> {
        let mut job = self.jobs.get_mut(&step.job_execution_id).ok_or_else(|| {
            BatchError::state_store(format!(
                "job execution {} does not exist",
                step.job_execution_id
            ))
        })?;

        step.id = self.next_step_id.fetch_add(1, Ordering::SeqCst);
        job.step_execution_ids.push(step.id);
        drop(job);

        self.steps.insert(step.id, step.clone());
        Ok(step)
    }

    async fn update_step_execution(&self, step: &StepExecution) -> BatchResult<()> {
        let mut stored = self.steps.get_mut(&step.id).ok_or_else(|| {
            BatchError::state_store(format!("step execution {} does not exist", step.id))
        })?;

        if stored.status.is_terminal() {
            return Err(BatchError::state_store(format!(
                "step execution {} ({}) is already {}",
                step.id, stored.step_name, stored.status
            )));
        }

        *stored = step.clone();
        Ok(())
    }

    async fn get_step_execution(&self, id: i64) -> BatchResult<Option<StepExecution>> {
        Ok(self.steps.get(&id).map(|step| step.clone()))
    }

    async fn find_step_executions(&self, job_execution_id: i64) -> BatchResult<Vec<StepExecution>> {
        let mut steps: Vec<StepExecution> = self
            .steps
            .iter()
            .filter(|step| step.job_execution_id == job_execution_id)
            .map(|step| step.clone())
            .collect();
        steps.sort_by_key(|step| step.id);
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionContext, JobParameters};
    use crate::state_machine::{BatchStatus, LifecycleEvent};
    use std::sync::Arc;

    fn job(name: &str, token: &str) -> JobExecution {
        JobExecution::new(name, token, JobParameters::with_run_token(token))
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let store = InMemoryExecutionStateStore::new();
        let first = store.create_job_execution(job("job", "1")).await.unwrap();
        assert_eq!(first.id, 1);

        let duplicate = store.create_job_execution(job("job", "1")).await;
        assert!(matches!(duplicate, Err(BatchError::DuplicateRun { .. })));
        assert_eq!(store.job_count(), 1);

        // Same token under another job name is a different identity
        store.create_job_execution(job("other", "1")).await.unwrap();
        assert_eq!(store.job_count(), 2);
    }

    #[tokio::test]
    async fn test_step_creation_attaches_to_job() {
        let store = InMemoryExecutionStateStore::new();
        let job = store.create_job_execution(job("job", "1")).await.unwrap();

        let step = store
            .create_step_execution(StepExecution::new(job.id, "step", ExecutionContext::new()))
            .await
            .unwrap();

        let stored_job = store.get_job_execution(job.id).await.unwrap().unwrap();
        assert_eq!(stored_job.step_execution_ids, vec![step.id]);

        // A stale job copy must not drop the step list
        let mut stale = job.clone();
        stale.transition(LifecycleEvent::Start).unwrap();
        store.update_job_execution(&stale).await.unwrap();
        let stored_job = store.get_job_execution(job.id).await.unwrap().unwrap();
        assert_eq!(stored_job.status, BatchStatus::Started);
        assert_eq!(stored_job.step_execution_ids, vec![step.id]);
    }

    #[tokio::test]
    async fn test_step_for_unknown_job_fails() {
        let store = InMemoryExecutionStateStore::new();
        let result = store
            .create_step_execution(StepExecution::new(42, "step", ExecutionContext::new()))
            .await;
        assert!(matches!(result, Err(BatchError::StateStore(_))));
    }

    #[tokio::test]
    async fn test_second_terminal_write_rejected() {
        let store = InMemoryExecutionStateStore::new();
        let job = store.create_job_execution(job("job", "1")).await.unwrap();
        let mut step = store
            .create_step_execution(StepExecution::new(job.id, "step", ExecutionContext::new()))
            .await
            .unwrap();

        step.transition(LifecycleEvent::Start).unwrap();
        step.transition(LifecycleEvent::Complete).unwrap();
        store.update_step_execution(&step).await.unwrap();

        let result = store.update_step_execution(&step).await;
        assert!(matches!(result, Err(BatchError::StateStore(_))));
    }

    #[tokio::test]
    async fn test_find_by_correlation_token() {
        let store = InMemoryExecutionStateStore::new();
        let correlated = JobExecution::new(
            "job.partition",
            "w1",
            JobParameters::with_run_token("w1").with("correlation.token", "m1"),
        );
        store.create_job_execution(correlated).await.unwrap();
        store.create_job_execution(job("job", "m1")).await.unwrap();

        let found = store.find_job_executions_by_correlation("m1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].run_token, "w1");

        let by_identity = store.find_job_execution("job", "m1").await.unwrap();
        assert!(by_identity.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_step_updates() {
        let store = Arc::new(InMemoryExecutionStateStore::new());
        let job_id = store.create_job_execution(job("job", "1")).await.unwrap().id;

        let mut handles = Vec::new();
        for index in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut step = store
                    .create_step_execution(StepExecution::new(
                        job_id,
                        format!("step{index}"),
                        ExecutionContext::new(),
                    ))
                    .await
                    .unwrap();
                step.transition(LifecycleEvent::Start).unwrap();
                step.record_commit(1, 1, 0);
                step.transition(LifecycleEvent::Complete).unwrap();
                store.update_step_execution(&step).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let steps = store.find_step_executions(job_id).await.unwrap();
        assert_eq!(steps.len(), 16);
        assert!(steps.iter().all(|s| s.status == BatchStatus::Completed));
        let stored_job = store.get_job_execution(job_id).await.unwrap().unwrap();
        assert_eq!(stored_job.step_execution_ids.len(), 16);
    }
}
