//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use partition_batch::chunk::{ChunkPipeline, ItemReader, ListItemReader, PassThroughProcessor};
use partition_batch::models::StepExecution;
use partition_batch::orchestration::{ChunkWorker, PartitionWorker};
use partition_batch::partition::PartitionRange;
use partition_batch::sample::TableWriter;
use std::sync::Arc;
use std::time::Duration;

/// Chunk worker that copies every key of its range into `output`
pub fn key_copy_worker(output: Arc<TableWriter<i64>>, chunk_size: usize) -> Arc<dyn PartitionWorker> {
    let factory = |range: &PartitionRange| -> anyhow::Result<Box<dyn ItemReader<i64>>> {
        Ok(Box::new(ListItemReader::new(range.start..=range.end)))
    };
    let worker: ChunkWorker<i64, i64> = ChunkWorker::new(
        Arc::new(factory),
        Arc::new(PassThroughProcessor),
        output,
        ChunkPipeline::new(chunk_size).expect("valid chunk size"),
    );
    Arc::new(worker)
}

/// Worker that panics on one partition and delegates the rest
#[derive(Debug)]
pub struct PanickingWorker {
    pub inner: Arc<dyn PartitionWorker>,
    pub partition: u32,
}

#[async_trait]
impl PartitionWorker for PanickingWorker {
    async fn execute(&self, step: StepExecution) -> StepExecution {
        if step.partition_number() == Some(self.partition) {
            panic!("worker blew up on partition {}", self.partition);
        }
        self.inner.execute(step).await
    }
}

/// Worker that never finishes within any reasonable timeout
#[derive(Debug)]
pub struct StuckWorker;

#[async_trait]
impl PartitionWorker for StuckWorker {
    async fn execute(&self, step: StepExecution) -> StepExecution {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        step
    }
}

pub fn sorted(mut keys: Vec<i64>) -> Vec<i64> {
    keys.sort_unstable();
    keys
}
