//! # Range Partitioner
//!
//! Splits a bounded integer key space into contiguous, non-overlapping ranges.
//!
//! The key space `[min_key, max_key]` is cut into `grid_size` blocks of
//! `ceil(extent / grid_size)` keys each. When the grid is larger than the extent the
//! trailing blocks come out empty (`start > end`): they stay in the [`PartitionSet`] so
//! callers can inspect the full plan, but [`PartitionSet::dispatchable`] leaves them out.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BatchError, BatchResult};

/// Inclusive key range assigned to one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionRange {
    pub start: i64,
    pub end: i64,
    /// Zero-based position of the range inside its set
    pub index: u32,
}

impl PartitionRange {
    pub fn new(start: i64, end: i64, index: u32) -> Self {
        Self { start, end, index }
    }

    /// A range with `start > end` holds no keys and is never dispatched
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of keys covered
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            (self.end as i128 - self.start as i128 + 1) as u64
        }
    }

    pub fn contains(&self, key: i64) -> bool {
        key >= self.start && key <= self.end
    }

    /// Name used for the partition's worker step execution, e.g. `partition2`
    pub fn partition_name(&self) -> String {
        format!("partition{}", self.index)
    }
}

impl fmt::Display for PartitionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}[{}, {}]", self.index, self.start, self.end)
    }
}

/// Inclusive bounds of the keys a job processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpace {
    pub min_key: i64,
    pub max_key: i64,
}

impl KeySpace {
    pub fn new(min_key: i64, max_key: i64) -> Self {
        Self { min_key, max_key }
    }

    /// Key space `[1, total_extent]`
    pub fn from_extent(total_extent: i64) -> Self {
        Self::new(1, total_extent)
    }

    /// Number of keys, negative when `max_key < min_key - 1`
    pub fn extent(&self) -> i128 {
        self.max_key as i128 - self.min_key as i128 + 1
    }
}

/// Ordered result of one partitioning pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSet {
    pub key_space: KeySpace,
    pub grid_size: u32,
    ranges: Vec<PartitionRange>,
}

impl PartitionSet {
    /// Every range, empty ones included, in index order
    pub fn ranges(&self) -> &[PartitionRange] {
        &self.ranges
    }

    /// Non-empty ranges, the only ones ever handed to a worker
    pub fn dispatchable(&self) -> Vec<PartitionRange> {
        self.ranges.iter().filter(|r| !r.is_empty()).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn empty_count(&self) -> usize {
        self.ranges.iter().filter(|r| r.is_empty()).count()
    }

    /// Total number of keys covered by the set
    pub fn covered_keys(&self) -> u64 {
        self.ranges.iter().map(PartitionRange::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartitionRange> {
        self.ranges.iter()
    }
}

/// Partition the key space `[1, total_extent]` into `grid_size` ranges
pub fn partition(total_extent: i64, grid_size: i64) -> BatchResult<PartitionSet> {
    if total_extent < 0 {
        return Err(BatchError::planning(format!(
            "total extent must not be negative, got {total_extent}"
        )));
    }
    partition_key_space(KeySpace::from_extent(total_extent), grid_size)
}

/// Partition an arbitrary inclusive key space into `grid_size` ranges
pub fn partition_key_space(key_space: KeySpace, grid_size: i64) -> BatchResult<PartitionSet> {
    if grid_size < 1 {
        return Err(BatchError::planning(format!(
            "grid size must be at least 1, got {grid_size}"
        )));
    }
    let grid = u32::try_from(grid_size)
        .map_err(|_| BatchError::planning(format!("grid size {grid_size} is too large")))?;

    let extent = key_space.extent();
    if extent < 0 {
        return Err(BatchError::planning(format!(
            "key space [{}, {}] has negative extent",
            key_space.min_key, key_space.max_key
        )));
    }

    let grid_wide = grid as i128;
    let block = (extent + grid_wide - 1) / grid_wide;
    let min = key_space.min_key as i128;
    let max = key_space.max_key as i128;

    let ranges = (0..grid)
        .map(|index| {
            let offset = index as i128 * block;
            let start = min + offset;
            if start > max {
                // Trailing empty range; only start > end matters
                let start = start.min(i64::MAX as i128) as i64;
                return PartitionRange::new(start, start - 1, index);
            }
            let end = (start + block - 1).min(max);
            PartitionRange::new(start as i64, end as i64, index)
        })
        .collect();

    Ok(PartitionSet {
        key_space,
        grid_size: grid,
        ranges,
    })
}
