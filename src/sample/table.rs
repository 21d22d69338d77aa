//! # Keyed In-Memory Table
//!
//! A table of rows keyed by `i64`, standing in for a database table:
//!
//! - [`PagingRangeReader`] reads `key BETWEEN start AND end` one page at a time
//! - [`TableWriter`] appends a whole chunk under one lock, so a chunk lands entirely or
//!   not at all
//! - [`KeySpaceProvider`] reports the table's smallest and largest key

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::chunk::{ItemReader, ItemReaderFactory, ItemWriter};
use crate::constants::defaults;
use crate::partition::{KeySpace, KeySpaceProvider, PartitionRange};

/// Rows keyed by id, shared between readers and writers
#[derive(Debug)]
pub struct InMemoryTable<T> {
    rows: RwLock<BTreeMap<i64, T>>,
}

impl<T> Default for InMemoryTable<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> InMemoryTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table filled from `(key, row)` pairs
    pub fn from_rows(rows: impl IntoIterator<Item = (i64, T)>) -> Self {
        Self {
            rows: RwLock::new(rows.into_iter().collect()),
        }
    }

    pub fn insert(&self, key: i64, row: T) {
        self.rows.write().insert(key, row);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    pub fn rows(&self) -> Vec<T> {
        self.rows.read().values().cloned().collect()
    }

    /// Up to `limit` rows with keys in `[from, to]`, in key order
    pub fn page(&self, from: i64, to: i64, limit: usize) -> Vec<(i64, T)> {
        if from > to {
            return Vec::new();
        }
        self.rows
            .read()
            .range(from..=to)
            .take(limit)
            .map(|(key, row)| (*key, row.clone()))
            .collect()
    }

    /// Reader factory handing out [`PagingRangeReader`]s over this table
    pub fn reader_factory(self: &Arc<Self>) -> PagingReaderFactory<T> {
        PagingReaderFactory {
            table: Arc::clone(self),
            page_size: defaults::PAGE_SIZE,
        }
    }
}

#[async_trait]
impl<T> KeySpaceProvider for InMemoryTable<T>
where
    T: fmt::Debug + Send + Sync,
{
    async fn key_space(&self) -> anyhow::Result<KeySpace> {
        let bounds = {
            let rows = self.rows.read();
            (rows.keys().next().copied(), rows.keys().next_back().copied())
        };
        Ok(match bounds {
            (Some(min), Some(max)) => KeySpace::new(min, max),
            // An empty table yields an extent of zero
            _ => KeySpace::new(1, 0),
        })
    }
}

/// Reads one partition's rows in pages
pub struct PagingRangeReader<T> {
    table: Arc<InMemoryTable<T>>,
    next_key: Option<i64>,
    end: i64,
    page_size: usize,
    buffer: VecDeque<T>,
    pages_read: usize,
}

impl<T: Clone + Send + Sync + 'static> PagingRangeReader<T> {
    pub fn new(table: Arc<InMemoryTable<T>>, range: &PartitionRange, page_size: usize) -> Self {
        Self {
            table,
            next_key: (!range.is_empty()).then_some(range.start),
            end: range.end,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            pages_read: 0,
        }
    }

    pub fn pages_read(&self) -> usize {
        self.pages_read
    }

    fn fetch_page(&mut self) {
        let Some(from) = self.next_key else {
            return;
        };
        let page = self.table.page(from, self.end, self.page_size);
        self.pages_read += 1;

        self.next_key = match page.last() {
            Some((last, _)) if page.len() == self.page_size && *last < self.end => Some(last + 1),
            _ => None,
        };
        self.buffer.extend(page.into_iter().map(|(_, row)| row));
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> ItemReader<T> for PagingRangeReader<T> {
    async fn read(&mut self) -> anyhow::Result<Option<T>> {
        if self.buffer.is_empty() {
            self.fetch_page();
        }
        Ok(self.buffer.pop_front())
    }
}

pub struct PagingReaderFactory<T> {
    table: Arc<InMemoryTable<T>>,
    page_size: usize,
}

impl<T> PagingReaderFactory<T> {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl<T: Clone + Send + Sync + 'static> ItemReaderFactory<T> for PagingReaderFactory<T> {
    fn open(&self, range: &PartitionRange) -> anyhow::Result<Box<dyn ItemReader<T>>> {
        Ok(Box::new(PagingRangeReader::new(
            Arc::clone(&self.table),
            range,
            self.page_size,
        )))
    }
}

/// Appends each chunk to an output table in one step
#[derive(Debug)]
pub struct TableWriter<O> {
    output: RwLock<Vec<O>>,
}

impl<O> Default for TableWriter<O> {
    fn default() -> Self {
        Self {
            output: RwLock::new(Vec::new()),
        }
    }
}

impl<O: Clone> TableWriter<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<O> {
        self.output.read().clone()
    }

    pub fn len(&self) -> usize {
        self.output.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.output.read().is_empty()
    }
}

#[async_trait]
impl<O: Send + Sync + 'static> ItemWriter<O> for TableWriter<O> {
    async fn write(&self, items: Vec<O>) -> anyhow::Result<()> {
        self.output.write().extend(items);
        Ok(())
    }
}
