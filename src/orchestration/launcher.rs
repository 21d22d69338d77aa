//! # Job Launcher
//!
//! Trigger surface over the [`JobCoordinator`]. Every run gets a strictly increasing
//! millisecond run token under the `timestamp` parameter, so repeated triggers always
//! start new job executions. Results come back as a [`TriggerResponse`]; the launcher
//! never propagates a job failure.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use super::coordinator::JobCoordinator;
use super::job::JobDefinition;
use crate::error::BatchError;
use crate::models::{JobExecution, JobParameters, ScalarValue};
use crate::state_machine::BatchStatus;

/// Outcome of a trigger, rendered as a one-line status message
#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub message: String,
    pub status: Option<BatchStatus>,
    pub job_execution_id: Option<i64>,
    pub run_token: Option<String>,
}

impl TriggerResponse {
    fn started(job: &JobExecution) -> Self {
        Self {
            message: format!("Job started successfully with status: {}", job.status),
            status: Some(job.status),
            job_execution_id: Some(job.id),
            run_token: Some(job.run_token.clone()),
        }
    }

    fn failed(error: &BatchError) -> Self {
        Self {
            message: format!("Job failed to start: {error}"),
            status: None,
            job_execution_id: None,
            run_token: None,
        }
    }

    /// The job ran; its own status may still be FAILED
    pub fn is_started(&self) -> bool {
        self.status.is_some()
    }
}

impl fmt::Display for TriggerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug)]
pub struct JobLauncher {
    coordinator: Arc<JobCoordinator>,
    jobs: HashMap<String, JobDefinition>,
    last_token: AtomicI64,
}

impl JobLauncher {
    pub fn new(coordinator: Arc<JobCoordinator>, jobs: impl IntoIterator<Item = JobDefinition>) -> Self {
        Self {
            coordinator,
            jobs: jobs
                .into_iter()
                .map(|job| (job.name().to_string(), job))
                .collect(),
            last_token: AtomicI64::new(0),
        }
    }

    pub fn job_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn coordinator(&self) -> &Arc<JobCoordinator> {
        &self.coordinator
    }

    /// Milliseconds since the epoch, bumped past the previous token when the clock has
    /// not advanced
    pub fn next_run_token(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last_token.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_token
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    /// Launch `job_name` with a fresh run token
    pub async fn run(&self, job_name: &str) -> TriggerResponse {
        let token = self.next_run_token();
        self.launch(job_name, JobParameters::with_run_token(token)).await
    }

    /// Launch `job_name` with a caller-supplied run token
    pub async fn run_with_token(&self, job_name: &str, run_token: impl Into<ScalarValue>) -> TriggerResponse {
        self.launch(job_name, JobParameters::with_run_token(run_token)).await
    }

    async fn launch(&self, job_name: &str, parameters: JobParameters) -> TriggerResponse {
        let Some(job) = self.jobs.get(job_name) else {
            let error = BatchError::planning(format!("unknown job '{job_name}'"));
            error!(job = job_name, "❌ LAUNCHER: {error}");
            return TriggerResponse::failed(&error);
        };

        match self.coordinator.launch(job, parameters).await {
            Ok(execution) => {
                let response = TriggerResponse::started(&execution);
                info!(
                    job = job_name,
                    job_execution_id = execution.id,
                    run_token = %execution.run_token,
                    "🚀 LAUNCHER: {response}"
                );
                response
            }
            Err(e) => {
                let response = TriggerResponse::failed(&e);
                error!(job = job_name, "❌ LAUNCHER: {response}");
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_response_message() {
        let response = TriggerResponse::failed(&BatchError::DuplicateRun {
            job_name: "partitionJob".to_string(),
            run_token: "42".to_string(),
        });
        assert!(response.message.starts_with("Job failed to start: "));
        assert!(response.message.contains("42"));
        assert!(!response.is_started());
    }
}
