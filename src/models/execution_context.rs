use serde::{Deserialize, Serialize};

use super::scalar::{ScalarMap, ScalarValue};
use crate::constants::context_keys;
use crate::partition::PartitionRange;

/// Per-step key/value state
///
/// Partition steps carry their assigned range under `start`, `end` and
/// `partitionNumber`; workers read the range back from here rather than from any
/// shared state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    entries: ScalarMap,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context describing one partition's range
    pub fn for_partition(range: &PartitionRange) -> Self {
        let mut context = Self::new();
        context.put(context_keys::START, range.start);
        context.put(context_keys::END, range.end);
        context.put(context_keys::PARTITION_NUMBER, range.index);
        context
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<ScalarValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.entries.get(key)
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ScalarValue::as_long)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScalarValue)> {
        self.entries.iter()
    }

    /// Range stored by [`Self::for_partition`], if all three keys are present
    pub fn partition_range(&self) -> Option<PartitionRange> {
        let start = self.get_long(context_keys::START)?;
        let end = self.get_long(context_keys::END)?;
        let index = self.get_long(context_keys::PARTITION_NUMBER)?;
        let index = u32::try_from(index).ok()?;
        Some(PartitionRange::new(start, end, index))
    }
}
