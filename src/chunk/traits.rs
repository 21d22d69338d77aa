//! Item-level collaborators of the chunk pipeline.
//!
//! Readers, processors and writers report failures as `anyhow::Error`; the pipeline
//! folds them into the step's exit message.

use async_trait::async_trait;
use std::collections::VecDeque;

use crate::partition::PartitionRange;

/// Source of items for one partition
///
/// `Ok(None)` signals end of data.
#[async_trait]
pub trait ItemReader<T: Send>: Send {
    async fn read(&mut self) -> anyhow::Result<Option<T>>;
}

/// Transforms one item; returning `Ok(None)` filters the item out of the chunk
#[async_trait]
pub trait ItemProcessor<I: Send, O: Send>: Send + Sync {
    async fn process(&self, item: I) -> anyhow::Result<Option<O>>;
}

/// Persists one processed chunk; a single call is the commit unit and must be atomic
#[async_trait]
pub trait ItemWriter<O: Send>: Send + Sync {
    async fn write(&self, items: Vec<O>) -> anyhow::Result<()>;
}

/// Builds a reader bound to one partition's range
///
/// The range is always passed in explicitly; readers never look it up from shared
/// state.
pub trait ItemReaderFactory<T: Send>: Send + Sync {
    fn open(&self, range: &PartitionRange) -> anyhow::Result<Box<dyn ItemReader<T>>>;
}

impl<T, F> ItemReaderFactory<T> for F
where
    T: Send,
    F: Fn(&PartitionRange) -> anyhow::Result<Box<dyn ItemReader<T>>> + Send + Sync,
{
    fn open(&self, range: &PartitionRange) -> anyhow::Result<Box<dyn ItemReader<T>>> {
        self(range)
    }
}

/// Reader over an in-memory list
#[derive(Debug, Clone)]
pub struct ListItemReader<T> {
    items: VecDeque<T>,
}

impl<T> ListItemReader<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl<T: Send> ItemReader<T> for ListItemReader<T> {
    async fn read(&mut self) -> anyhow::Result<Option<T>> {
        Ok(self.items.pop_front())
    }
}

/// Processor that passes items through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughProcessor;

#[async_trait]
impl<T: Send + 'static> ItemProcessor<T, T> for PassThroughProcessor {
    async fn process(&self, item: T) -> anyhow::Result<Option<T>> {
        Ok(Some(item))
    }
}
