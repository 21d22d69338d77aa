//! # Partition Dispatch
//!
//! Strategies for handing partition ranges to workers.
//!
//! | Strategy | Delivery | Master waits for |
//! |----------|----------|------------------|
//! | [`LocalPoolDispatcher`] | in-process tasks on a bounded pool | every partition |
//! | [`ChannelDispatcher`] | request queue, reply queue per run | every reply or the reply timeout |
//! | [`BrokerDispatcher`] | topic publish | nothing, returns after publishing |
//!
//! The synchronous strategies return [`ExecutionOutcome::Collected`] with the terminal
//! partition step executions. The broker strategy returns
//! [`ExecutionOutcome::Dispatched`]; its partitions are tracked as separate job
//! executions correlated by run token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BatchResult;
use crate::models::{JobExecution, StepExecution};
use crate::partition::PartitionRange;
use crate::state_machine::BatchStatus;

pub mod broker;
pub mod channel;
pub mod local_pool;

pub use broker::BrokerDispatcher;
pub use channel::ChannelDispatcher;
pub use local_pool::LocalPoolDispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStrategy {
    #[default]
    Local,
    Channel,
    Broker,
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Channel => write!(f, "channel"),
            Self::Broker => write!(f, "broker"),
        }
    }
}

impl FromStr for DispatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "local_pool" => Ok(Self::Local),
            "channel" => Ok(Self::Channel),
            "broker" => Ok(Self::Broker),
            _ => Err(format!("Invalid dispatch strategy: {s}")),
        }
    }
}

/// Everything a dispatcher needs to fan out one master step
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub job: JobExecution,
    pub master_step: StepExecution,
    /// Non-empty ranges only, in index order
    pub partitions: Vec<PartitionRange>,
}

impl DispatchRequest {
    /// Name given to each partition's worker step
    pub fn worker_step_name(&self) -> String {
        crate::constants::worker_step_name(&self.job.job_name)
    }
}

/// What the master learns from a dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Terminal step executions, one per dispatched partition, in index order
    Collected(Vec<StepExecution>),
    /// Envelopes were published; completion is tracked outside the master job
    Dispatched {
        run_token: String,
        destination: String,
        published: usize,
    },
}

impl ExecutionOutcome {
    /// Status the master step takes from this outcome
    ///
    /// FAILED if any collected partition failed. A `Dispatched` outcome counts as
    /// COMPLETED: publishing succeeded, nothing is known about the work itself.
    pub fn aggregate_status(&self) -> BatchStatus {
        match self {
            Self::Collected(steps) => steps
                .iter()
                .fold(BatchStatus::Completed, |status, step| status.upgrade_to(step.status)),
            Self::Dispatched { .. } => BatchStatus::Completed,
        }
    }

    /// Collected partitions that did not complete
    pub fn failed_partitions(&self) -> Vec<&StepExecution> {
        match self {
            Self::Collected(steps) => steps
                .iter()
                .filter(|step| step.status != BatchStatus::Completed)
                .collect(),
            Self::Dispatched { .. } => Vec::new(),
        }
    }

    pub fn partition_count(&self) -> usize {
        match self {
            Self::Collected(steps) => steps.len(),
            Self::Dispatched { published, .. } => *published,
        }
    }

    pub fn is_asynchronous(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

#[async_trait]
pub trait PartitionDispatcher: Send + Sync + fmt::Debug {
    /// Deliver every partition of the request to a worker
    ///
    /// `Err` means the dispatch as a whole failed (transport unavailable, store
    /// refused a write); individual partition failures are reported inside a
    /// `Collected` outcome.
    async fn dispatch(&self, request: DispatchRequest) -> BatchResult<ExecutionOutcome>;

    fn strategy(&self) -> DispatchStrategy;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionContext;

    fn step_with(status: BatchStatus) -> StepExecution {
        let mut step = StepExecution::new(1, "s", ExecutionContext::new());
        step.status = status;
        step
    }

    #[test]
    fn test_aggregate_any_failure_fails() {
        let outcome = ExecutionOutcome::Collected(vec![
            step_with(BatchStatus::Completed),
            step_with(BatchStatus::Failed),
            step_with(BatchStatus::Completed),
        ]);
        assert_eq!(outcome.aggregate_status(), BatchStatus::Failed);
        assert_eq!(outcome.failed_partitions().len(), 1);
    }

    #[test]
    fn test_aggregate_all_completed() {
        let outcome = ExecutionOutcome::Collected(vec![
            step_with(BatchStatus::Completed),
            step_with(BatchStatus::Completed),
        ]);
        assert_eq!(outcome.aggregate_status(), BatchStatus::Completed);
        assert_eq!(
            ExecutionOutcome::Collected(Vec::new()).aggregate_status(),
            BatchStatus::Completed
        );
    }

    #[test]
    fn test_dispatched_counts_as_completed() {
        let outcome = ExecutionOutcome::Dispatched {
            run_token: "1".to_string(),
            destination: "batch-partitions".to_string(),
            published: 3,
        };
        assert_eq!(outcome.aggregate_status(), BatchStatus::Completed);
        assert!(outcome.is_asynchronous());
        assert_eq!(outcome.partition_count(), 3);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Channel".parse::<DispatchStrategy>().unwrap(), DispatchStrategy::Channel);
        assert_eq!(DispatchStrategy::Broker.to_string(), "broker");
        assert!("kafka".parse::<DispatchStrategy>().is_err());
    }
}
