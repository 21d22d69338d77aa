//! # Chunk-Oriented Processing
//!
//! The worker-side pipeline plus the reader, processor and writer seams it drives.

pub mod pipeline;
pub mod traits;

pub use pipeline::{ChunkPhase, ChunkPipeline};
pub use traits::{
    ItemProcessor, ItemReader, ItemReaderFactory, ItemWriter, ListItemReader,
    PassThroughProcessor,
};
