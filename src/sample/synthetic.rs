//! Synthetic per-partition items for demos and broker workers.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::chunk::{ItemProcessor, ItemReader, ItemReaderFactory, ItemWriter};
use crate::partition::PartitionRange;

pub const SYNTHETIC_ITEMS_PER_PARTITION: usize = 5;

/// Produces `"Item n from partition p"` for n in `0..count`
#[derive(Debug, Clone)]
pub struct SyntheticItemReader {
    partition_number: u32,
    count: usize,
    produced: usize,
}

impl SyntheticItemReader {
    pub fn new(partition_number: u32) -> Self {
        Self::with_count(partition_number, SYNTHETIC_ITEMS_PER_PARTITION)
    }

    pub fn with_count(partition_number: u32, count: usize) -> Self {
        Self {
            partition_number,
            count,
            produced: 0,
        }
    }
}

#[async_trait]
impl ItemReader<String> for SyntheticItemReader {
    async fn read(&mut self) -> anyhow::Result<Option<String>> {
        if self.produced >= self.count {
            return Ok(None);
        }
        let item = format!("Item {} from partition {}", self.produced, self.partition_number);
        self.produced += 1;
        Ok(Some(item))
    }
}

/// Opens a [`SyntheticItemReader`] for each partition
#[derive(Debug, Clone, Copy)]
pub struct SyntheticReaderFactory {
    pub items_per_partition: usize,
}

impl Default for SyntheticReaderFactory {
    fn default() -> Self {
        Self {
            items_per_partition: SYNTHETIC_ITEMS_PER_PARTITION,
        }
    }
}

impl ItemReaderFactory<String> for SyntheticReaderFactory {
    fn open(&self, range: &PartitionRange) -> anyhow::Result<Box<dyn ItemReader<String>>> {
        Ok(Box::new(SyntheticItemReader::with_count(
            range.index,
            self.items_per_partition,
        )))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseProcessor;

#[async_trait]
impl ItemProcessor<String, String> for UppercaseProcessor {
    async fn process(&self, item: String) -> anyhow::Result<Option<String>> {
        Ok(Some(item.to_uppercase()))
    }
}

/// Logs each chunk and keeps a copy of what it wrote
#[derive(Debug, Default)]
pub struct LoggingItemWriter {
    written: Mutex<Vec<String>>,
}

impl LoggingItemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }
}

#[async_trait]
impl ItemWriter<String> for LoggingItemWriter {
    async fn write(&self, items: Vec<String>) -> anyhow::Result<()> {
        tracing::info!(count = items.len(), items = ?items, "✍️ WRITER: Chunk written");
        self.written.lock().extend(items);
        Ok(())
    }
}
