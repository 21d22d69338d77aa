//! # Step Execution Model
//!
//! One execution of a step inside a job run. A partitioned job has one master step
//! execution plus one step execution per dispatched partition; the partition's range
//! travels in the step's [`ExecutionContext`].
//!
//! Counters only ever reflect committed chunks: the chunk pipeline adds to them after a
//! write succeeds, and a rolled-back chunk only bumps `rollback_count`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::execution_context::ExecutionContext;
use crate::partition::PartitionRange;
use crate::state_machine::{determine_target_state, BatchStatus, LifecycleEvent, StateMachineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    /// Assigned by the execution state store; 0 until persisted
    pub id: i64,
    pub job_execution_id: i64,
    pub step_name: String,
    pub status: BatchStatus,
    pub context: ExecutionContext,
    pub read_count: u64,
    pub write_count: u64,
    pub filter_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_message: Option<String>,
}

impl StepExecution {
    pub fn new(
        job_execution_id: i64,
        step_name: impl Into<String>,
        context: ExecutionContext,
    ) -> Self {
        Self {
            id: 0,
            job_execution_id,
            step_name: step_name.into(),
            status: BatchStatus::Starting,
            context,
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            commit_count: 0,
            rollback_count: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            exit_message: None,
        }
    }

    /// Step execution for one partition, named `<step_name>:partition<N>`
    pub fn for_partition(job_execution_id: i64, step_name: &str, range: &PartitionRange) -> Self {
        Self::new(
            job_execution_id,
            format!("{step_name}:{}", range.partition_name()),
            ExecutionContext::for_partition(range),
        )
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

    /// Record a successfully written chunk
    pub fn record_commit(&mut self, read: u64, written: u64, filtered: u64) {
        self.read_count += read;
        self.write_count += written;
        self.filter_count += filtered;
        self.commit_count += 1;
    }

    pub fn record_rollback(&mut self) {
        self.rollback_count += 1;
    }

    pub fn partition_range(&self) -> Option<PartitionRange> {
        self.context.partition_range()
    }

    /// Partition index, if this is a partition step
    pub fn partition_number(&self) -> Option<u32> {
        self.partition_range().map(|range| range.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_step_naming() {
        let range = PartitionRange::new(5, 8, 1);
        let step = StepExecution::for_partition(7, "job.worker", &range);

        assert_eq!(step.step_name, "job.worker:partition1");
        assert_eq!(step.job_execution_id, 7);
        assert_eq!(step.partition_number(), Some(1));
        assert_eq!(step.status, BatchStatus::Starting);
    }

    #[test]
    fn test_commit_and_rollback_counters() {
        let mut step = StepExecution::new(1, "step", ExecutionContext::new());
        step.record_commit(2, 2, 0);
        step.record_commit(2, 1, 1);
        step.record_rollback();

        assert_eq!(step.read_count, 4);
        assert_eq!(step.write_count, 3);
        assert_eq!(step.filter_count, 1);
        assert_eq!(step.commit_count, 2);
        assert_eq!(step.rollback_count, 1);
    }
}
