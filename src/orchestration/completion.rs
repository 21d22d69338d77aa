//! # Completion Tracker
//!
//! Broker jobs finish as soon as their envelopes are published. The partition jobs the
//! consumers launch carry the master's run token as correlation token; the tracker polls
//! the store for them.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{BatchError, BatchResult};
use crate::store::ExecutionStateStore;

/// Partition jobs seen for one correlation token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
}

impl CompletionSummary {
    /// Every expected partition reached a terminal status
    pub fn is_settled(&self, expected: usize) -> bool {
        self.completed + self.failed >= expected
    }
}

#[derive(Debug, Clone)]
pub struct CompletionTracker {
    store: Arc<dyn ExecutionStateStore>,
}

impl CompletionTracker {
    pub fn new(store: Arc<dyn ExecutionStateStore>) -> Self {
        Self { store }
    }

    pub async fn summary(&self, correlation_token: &str) -> BatchResult<CompletionSummary> {
        let jobs = self
            .store
            .find_job_executions_by_correlation(correlation_token)
            .await?;

        Ok(jobs.iter().fold(CompletionSummary::default(), |mut summary, job| {
            summary.total += 1;
            if !job.status.is_terminal() {
                summary.running += 1;
            } else if job.status.is_unsuccessful() {
                summary.failed += 1;
            } else {
                summary.completed += 1;
            }
            summary
        }))
    }

    /// Poll until `expected` partition jobs are terminal or `timeout` elapses
    pub async fn wait_for(
        &self,
        correlation_token: &str,
        expected: usize,
        poll_interval: Duration,
        timeout: Duration,
    ) -> BatchResult<CompletionSummary> {
        let deadline = Instant::now() + timeout;
        loop {
            let summary = self.summary(correlation_token).await?;
            if summary.is_settled(expected) {
                return Ok(summary);
            }
            if Instant::now() >= deadline {
                return Err(BatchError::CorrelationLost {
                    run_token: correlation_token.to_string(),
                    missing: expected.saturating_sub(summary.completed + summary.failed),
                });
            }
            debug!(
                correlation_token = correlation_token,
                settled = summary.completed + summary.failed,
                expected = expected,
                "⏳ COMPLETION: Waiting for partition jobs"
            );
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::params;
    use crate::models::{JobExecution, JobParameters};
    use crate::state_machine::LifecycleEvent;
    use crate::store::InMemoryExecutionStateStore;

    async fn partition_job(
        store: &InMemoryExecutionStateStore,
        token: &str,
        event: Option<LifecycleEvent>,
    ) {
        let parameters = JobParameters::with_run_token(token)
            .with(params::CORRELATION_TOKEN, "master-1");
        let mut job = store
            .create_job_execution(JobExecution::new("job.partition", token, parameters))
            .await
            .unwrap();
        job.transition(LifecycleEvent::Start).unwrap();
        if let Some(event) = event {
            job.transition(event).unwrap();
        }
        store.update_job_execution(&job).await.unwrap();
    }

    #[tokio::test]
    async fn test_summary_counts_by_status() {
        let store = Arc::new(InMemoryExecutionStateStore::new());
        partition_job(&store, "a", Some(LifecycleEvent::Complete)).await;
        partition_job(&store, "b", Some(LifecycleEvent::fail_with_error("boom"))).await;
        partition_job(&store, "c", None).await;

        let tracker = CompletionTracker::new(store);
        let summary = tracker.summary("master-1").await.unwrap();
        assert_eq!(
            summary,
            CompletionSummary {
                total: 3,
                completed: 1,
                failed: 1,
                running: 1
            }
        );
        assert!(!summary.is_settled(3));
        assert!(tracker.summary("other").await.unwrap().total == 0);
    }

    #[tokio::test]
    async fn test_wait_for_times_out_with_missing_count() {
        let store = Arc::new(InMemoryExecutionStateStore::new());
        partition_job(&store, "a", Some(LifecycleEvent::Complete)).await;

        let tracker = CompletionTracker::new(store);
        let error = tracker
            .wait_for("master-1", 3, Duration::from_millis(5), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(error, BatchError::CorrelationLost { missing: 2, .. }));
    }
}
