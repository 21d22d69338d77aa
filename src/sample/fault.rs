//! Worker decorator that fails or delays chosen partitions.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::BatchError;
use crate::models::StepExecution;
use crate::orchestration::PartitionWorker;
use crate::state_machine::LifecycleEvent;

#[derive(Debug, Clone)]
pub struct FaultInjectingWorker {
    inner: Arc<dyn PartitionWorker>,
    failing_partitions: HashSet<u32>,
    delay: Option<Duration>,
}

impl FaultInjectingWorker {
    pub fn new(inner: Arc<dyn PartitionWorker>) -> Self {
        Self {
            inner,
            failing_partitions: HashSet::new(),
            delay: None,
        }
    }

    /// Fail `partition` without running the inner worker
    pub fn fail_partition(mut self, partition: u32) -> Self {
        self.failing_partitions.insert(partition);
        self
    }

    /// Sleep before every partition
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl PartitionWorker for FaultInjectingWorker {
    async fn execute(&self, mut step: StepExecution) -> StepExecution {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match step.partition_number() {
            Some(partition) if self.failing_partitions.contains(&partition) => {
                let error = BatchError::worker(&step.step_name, format!("injected failure for partition {partition}"));
                warn!(step_id = step.id, partition = partition, "💣 FAULT: {error}");
                if let Err(e) = step.transition(LifecycleEvent::fail_with_error(error.to_string())) {
                    error!(step_id = step.id, error = %e, "❌ FAULT: Could not mark step failed");
                }
                step
            }
            _ => self.inner.execute(step).await,
        }
    }
}
