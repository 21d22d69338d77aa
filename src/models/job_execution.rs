//! # Job Execution Model
//!
//! One run of a job, identified by `(job_name, run_token)`.
//!
//! ## Lifecycle
//!
//! ```text
//! STARTING -> STARTED -> COMPLETED
//!                  \---> FAILED
//! ```
//!
//! Status changes go through [`JobExecution::transition`], which consults the shared
//! transition table in [`crate::state_machine`] and stamps the lifecycle timestamps.
//! Only the job coordinator mutates a job execution's status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job_parameters::JobParameters;
use crate::state_machine::{determine_target_state, BatchStatus, LifecycleEvent, StateMachineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    /// Assigned by the execution state store; 0 until persisted
    pub id: i64,
    pub job_name: String,
    pub run_token: String,
    pub parameters: JobParameters,
    pub status: BatchStatus,
    /// Step executions created for this run, in creation order
    pub step_execution_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_message: Option<String>,
}

impl JobExecution {
    pub fn new(
        job_name: impl Into<String>,
        run_token: impl Into<String>,
        parameters: JobParameters,
    ) -> Self {
        Self {
            id: 0,
            job_name: job_name.into(),
            run_token: run_token.into(),
            parameters,
            status: BatchStatus::Starting,
            step_execution_ids: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            exit_message: None,
        }
    }

    /// Apply a lifecycle event, returning the new status
    pub fn transition(&mut self, event: LifecycleEvent) -> StateMachineResult<BatchStatus> {
        let target = determine_target_state(self.status, &event)?;
        let now = Utc::now();

        match &event {
            LifecycleEvent::Start => self.started_at = Some(now),
            LifecycleEvent::Complete => self.ended_at = Some(now),
            LifecycleEvent::Fail(message) => {
                self.ended_at = Some(now);
                self.exit_message = Some(message.clone());
            }
        }

        self.status = target;
        Ok(target)
    }

    /// Wall-clock duration between start and end, when both are known
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(started), Some(ended)) => Some((ended - started).num_milliseconds()),
            _ => None,
        }
    }
}
