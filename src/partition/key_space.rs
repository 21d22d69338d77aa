use async_trait::async_trait;
use std::fmt::Debug;

use super::range::KeySpace;

/// Source of the key space a partitioned job covers
///
/// Typically a `SELECT MIN(id), MAX(id)` against the source table. A failure here
/// aborts the job before any partition is dispatched.
#[async_trait]
pub trait KeySpaceProvider: Send + Sync + Debug {
    async fn key_space(&self) -> anyhow::Result<KeySpace>;
}

/// Key space known up front
#[derive(Debug, Clone, Copy)]
pub struct FixedKeySpace(pub KeySpace);

impl FixedKeySpace {
    pub fn from_extent(total_extent: i64) -> Self {
        Self(KeySpace::from_extent(total_extent))
    }
}

#[async_trait]
impl KeySpaceProvider for FixedKeySpace {
    async fn key_space(&self) -> anyhow::Result<KeySpace> {
        Ok(self.0)
    }
}
