#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, pgmq in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Partition Batch
//!
//! Partitioned batch execution: a master step cuts a numeric key space into contiguous
//! ranges, hands each range to a worker and rolls the partition results up into one job
//! status.
//!
//! ## Architecture
//!
//! ```text
//! JobLauncher -> JobCoordinator -> RangePartitioner
//!                      |
//!                      v
//!              PartitionDispatcher --(local pool | channel | broker)--> PartitionWorker
//!                                                                          |
//!                                                                          v
//!                                                                    ChunkPipeline
//! ```
//!
//! Every job and step execution lives in an [`store::ExecutionStateStore`] and moves
//! through the `STARTING -> STARTED -> COMPLETED | FAILED` lifecycle in
//! [`state_machine`].
//!
//! ## Dispatch strategies
//!
//! - **local**: partitions run as tokio tasks in this process
//! - **channel**: request/reply over a message transport, correlated by run token
//! - **broker**: fire-and-forget publish to a topic; consumers launch their own
//!   single-partition jobs
//!
//! ## Module Organization
//!
//! - [`partition`] - Range arithmetic and key-space providers
//! - [`dispatch`] - Partition dispatch strategies
//! - [`chunk`] - Read/process/write pipeline and its item seams
//! - [`orchestration`] - Coordinator, launcher, listeners and bootstrap
//! - [`store`] - Execution state persistence
//! - [`messaging`] - Envelopes and message transports
//! - [`models`] - Job and step executions, parameters, execution contexts
//! - [`state_machine`] - Lifecycle statuses and transitions
//! - [`config`] - Layered configuration
//! - [`events`] - Lifecycle event broadcasting
//! - [`sample`] - Demo readers, processors and writers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use partition_batch::chunk::ChunkPipeline;
//! use partition_batch::config::BatchConfig;
//! use partition_batch::orchestration::{BatchSystem, ChunkWorker, JobDefinition};
//! use partition_batch::sample::{LoggingItemWriter, SyntheticReaderFactory, UppercaseProcessor};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BatchConfig::default();
//! let worker = Arc::new(ChunkWorker::new(
//!     Arc::new(SyntheticReaderFactory::default()),
//!     Arc::new(UppercaseProcessor),
//!     Arc::new(LoggingItemWriter::new()),
//!     ChunkPipeline::new(config.chunk.chunk_size)?,
//! ));
//! let job = JobDefinition::from_config("partitionJob", 10, &config.partitioning);
//!
//! let mut system = BatchSystem::bootstrap(config, worker, vec![job]).await?;
//! let response = system.launcher().run("partitionJob").await;
//! println!("{response}");
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod chunk;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod partition;
pub mod sample;
pub mod state_machine;
pub mod store;

pub use chunk::{ChunkPipeline, ItemProcessor, ItemReader, ItemReaderFactory, ItemWriter};
pub use config::{BatchConfig, ConfigManager};
pub use dispatch::{DispatchStrategy, ExecutionOutcome, PartitionDispatcher};
pub use error::{BatchError, BatchResult};
pub use events::{EventPublisher, PublishedEvent};
pub use models::{ExecutionContext, JobExecution, JobParameters, StepExecution};
pub use orchestration::{
    BatchSystem, ChunkWorker, JobCoordinator, JobDefinition, JobLauncher, PartitionWorker,
    TriggerResponse,
};
pub use partition::{partition, partition_key_space, KeySpace, PartitionRange, PartitionSet};
pub use state_machine::BatchStatus;
pub use store::{ExecutionStateStore, InMemoryExecutionStateStore};
