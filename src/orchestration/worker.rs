//! # Partition Workers
//!
//! A [`PartitionWorker`] executes one partition's step execution. [`ChunkWorker`] is
//! the standard implementation: it opens a reader on the partition's range and drives
//! it through a [`ChunkPipeline`].
//!
//! [`execute_partition_step`] wraps any worker with the bookkeeping every strategy
//! shares: STARTED before the work, the terminal status after it, both persisted and
//! published as lifecycle events.

use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, instrument, warn};

use crate::chunk::{ChunkPipeline, ItemProcessor, ItemReaderFactory, ItemWriter};
use crate::constants::events;
use crate::error::BatchResult;
use crate::events::EventPublisher;
use crate::logging::log_step_operation;
use crate::models::StepExecution;
use crate::state_machine::{BatchStatus, LifecycleEvent};
use crate::store::ExecutionStateStore;

#[async_trait]
pub trait PartitionWorker: Send + Sync + fmt::Debug {
    /// Process the step's partition and return the step in a terminal status
    ///
    /// The step arrives STARTED with its range in the execution context. Failures are
    /// reported through the returned step's status and exit message.
    async fn execute(&self, step: StepExecution) -> StepExecution;
}

/// Chunk-oriented worker over a reader factory, a processor and a writer
pub struct ChunkWorker<I, O> {
    reader_factory: Arc<dyn ItemReaderFactory<I>>,
    processor: Arc<dyn ItemProcessor<I, O>>,
    writer: Arc<dyn ItemWriter<O>>,
    pipeline: ChunkPipeline,
}

impl<I, O> ChunkWorker<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new(
        reader_factory: Arc<dyn ItemReaderFactory<I>>,
        processor: Arc<dyn ItemProcessor<I, O>>,
        writer: Arc<dyn ItemWriter<O>>,
        pipeline: ChunkPipeline,
    ) -> Self {
        Self {
            reader_factory,
            processor,
            writer,
            pipeline,
        }
    }
}

impl<I, O> fmt::Debug for ChunkWorker<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkWorker")
            .field("chunk_size", &self.pipeline.chunk_size())
            .finish()
    }
}

#[async_trait]
impl<I, O> PartitionWorker for ChunkWorker<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn execute(&self, mut step: StepExecution) -> StepExecution {
        let Some(range) = step.partition_range() else {
            if let Err(e) = step.transition(LifecycleEvent::fail_with_error(
                "execution context carries no partition range",
            )) {
                error!(step_id = step.id, error = %e, "❌ WORKER: Could not mark step failed");
            }
            return step;
        };

        let mut reader = match self.reader_factory.open(&range) {
            Ok(reader) => reader,
            Err(e) => {
                let reason = format!("Failed to open reader for {range}: {e:#}");
                if let Err(e) = step.transition(LifecycleEvent::fail_with_error(reason)) {
                    error!(step_id = step.id, error = %e, "❌ WORKER: Could not mark step failed");
                }
                return step;
            }
        };

        self.pipeline
            .run(step, &mut *reader, &*self.processor, &*self.writer)
            .await
    }
}

/// Start, execute and finish one partition step, persisting each transition
///
/// Returns the terminal step. `Err` only reports that the store refused a write; the
/// caller then owns marking the partition FAILED.
#[instrument(skip_all, fields(step_id = step.id, step_name = %step.step_name))]
pub async fn execute_partition_step(
    worker: &dyn PartitionWorker,
    store: &dyn ExecutionStateStore,
    publisher: &EventPublisher,
    mut step: StepExecution,
) -> BatchResult<StepExecution> {
    if step.status == BatchStatus::Starting {
        step.transition(LifecycleEvent::Start)?;
        store.update_step_execution(&step).await?;
    }
    publisher.publish(
        events::STEP_STARTED,
        json!({
            "step_execution_id": step.id,
            "job_execution_id": step.job_execution_id,
            "step_name": step.step_name,
        }),
    );

    let mut finished = worker.execute(step).await;
    if !finished.status.is_terminal() {
        warn!(status = %finished.status, "⚠️ WORKER: Returned a non-terminal step");
        if finished.status == BatchStatus::Starting {
            finished.transition(LifecycleEvent::Start)?;
        }
        finished.transition(LifecycleEvent::fail_with_error(
            "worker returned without finishing the step",
        ))?;
    }

    store.update_step_execution(&finished).await?;
    publish_step_outcome(publisher, &finished);
    Ok(finished)
}

/// Emit the terminal lifecycle event and structured log line for a step
pub(crate) fn publish_step_outcome(publisher: &EventPublisher, step: &StepExecution) {
    let event = if step.status == BatchStatus::Completed {
        events::STEP_COMPLETED
    } else {
        events::STEP_FAILED
    };
    publisher.publish(
        event,
        json!({
            "step_execution_id": step.id,
            "job_execution_id": step.job_execution_id,
            "step_name": step.step_name,
            "status": step.status,
            "read_count": step.read_count,
            "write_count": step.write_count,
            "exit_message": step.exit_message,
        }),
    );

    log_step_operation(
        "finish",
        Some(step.job_execution_id),
        Some(step.id),
        Some(&step.step_name),
        &step.status.to_string(),
        step.exit_message.as_deref(),
    );
}

/// Mark a step FAILED after its worker could not report back (panic, timeout, lost
/// reply) and persist it if the store still accepts the write
pub(crate) async fn fail_unfinished_step(
    store: &dyn ExecutionStateStore,
    publisher: &EventPublisher,
    mut step: StepExecution,
    reason: String,
) -> StepExecution {
    // The stored copy may be further along than the caller's snapshot
    if let Ok(Some(stored)) = store.get_step_execution(step.id).await {
        if stored.status.is_terminal() {
            return stored;
        }
        step = stored;
    }

    if let Err(e) = step.transition(LifecycleEvent::fail_with_error(reason)) {
        error!(step_id = step.id, error = %e, "❌ WORKER: Could not mark step failed");
        return step;
    }
    if let Err(e) = store.update_step_execution(&step).await {
        error!(step_id = step.id, error = %e, "❌ WORKER: Could not persist failed step");
    }
    publish_step_outcome(publisher, &step);
    step
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ItemReader, ListItemReader, PassThroughProcessor};
    use crate::models::{JobExecution, JobParameters};
    use crate::partition::PartitionRange;
    use crate::store::InMemoryExecutionStateStore;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectingWriter {
        items: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl ItemWriter<i64> for CollectingWriter {
        async fn write(&self, items: Vec<i64>) -> anyhow::Result<()> {
            self.items.lock().extend(items);
            Ok(())
        }
    }

    fn range_worker(writer: Arc<CollectingWriter>) -> ChunkWorker<i64, i64> {
        let factory = |range: &PartitionRange| -> anyhow::Result<Box<dyn ItemReader<i64>>> {
            Ok(Box::new(ListItemReader::new(range.start..=range.end)))
        };
        ChunkWorker::new(
            Arc::new(factory),
            Arc::new(PassThroughProcessor),
            writer,
            ChunkPipeline::new(2).unwrap(),
        )
    }

    async fn persisted_step(store: &InMemoryExecutionStateStore, range: PartitionRange) -> StepExecution {
        let job = store
            .create_job_execution(JobExecution::new("job", "1", JobParameters::with_run_token("1")))
            .await
            .unwrap();
        store
            .create_step_execution(StepExecution::for_partition(job.id, "job.worker", &range))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_chunk_worker_reads_only_its_range() {
        let store = InMemoryExecutionStateStore::new();
        let writer = Arc::new(CollectingWriter::default());
        let worker = range_worker(Arc::clone(&writer));
        let step = persisted_step(&store, PartitionRange::new(5, 8, 1)).await;

        let finished = execute_partition_step(&worker, &store, &EventPublisher::default(), step)
            .await
            .unwrap();

        assert_eq!(finished.status, BatchStatus::Completed);
        assert_eq!(*writer.items.lock(), vec![5, 6, 7, 8]);
        assert_eq!(finished.commit_count, 2);

        let stored = store.get_step_execution(finished.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BatchStatus::Completed);
        assert_eq!(stored.write_count, 4);
    }

    #[tokio::test]
    async fn test_missing_range_fails_step() {
        let store = InMemoryExecutionStateStore::new();
        let job = store
            .create_job_execution(JobExecution::new("job", "1", JobParameters::new()))
            .await
            .unwrap();
        let step = store
            .create_step_execution(StepExecution::new(
                job.id,
                "job.worker",
                Default::default(),
            ))
            .await
            .unwrap();

        let worker = range_worker(Arc::new(CollectingWriter::default()));
        let finished = execute_partition_step(&worker, &store, &EventPublisher::default(), step)
            .await
            .unwrap();

        assert_eq!(finished.status, BatchStatus::Failed);
        assert!(finished
            .exit_message
            .unwrap()
            .contains("no partition range"));
    }

    #[tokio::test]
    async fn test_fail_unfinished_step_respects_terminal_store_copy() {
        let store = InMemoryExecutionStateStore::new();
        let writer = Arc::new(CollectingWriter::default());
        let worker = range_worker(writer);
        let step = persisted_step(&store, PartitionRange::new(1, 2, 0)).await;
        let snapshot = step.clone();

        execute_partition_step(&worker, &store, &EventPublisher::default(), step)
            .await
            .unwrap();

        let result = fail_unfinished_step(
            &store,
            &EventPublisher::default(),
            snapshot,
            "timed out".to_string(),
        )
        .await;
        assert_eq!(result.status, BatchStatus::Completed);
    }
}
