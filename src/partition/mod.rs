//! # Partitioning
//!
//! Pure range arithmetic plus the provider seam used to discover a job's key space.

pub mod key_space;
pub mod range;

pub use key_space::{FixedKeySpace, KeySpaceProvider};
pub use range::{partition, partition_key_space, KeySpace, PartitionRange, PartitionSet};
