//! # Orchestration
//!
//! Job-level control flow on top of partitioning and dispatch.
//!
//! ## Components
//!
//! - **JobCoordinator**: plans a job into partitions, dispatches them and aggregates the
//!   result onto the master step and the job execution
//! - **JobLauncher**: trigger surface that issues run tokens and reports a status line
//! - **PartitionWorker**: executes one partition; `ChunkWorker` drives a chunk pipeline
//! - **ChannelPartitionHandler**: answers channel dispatch requests
//! - **BrokerConsumer**: turns broker envelopes into single-partition job executions
//! - **CompletionTracker**: follows broker partition jobs by correlation token
//! - **BatchSystem**: composition root and listener lifecycle

pub mod bootstrap;
pub mod broker_consumer;
pub mod channel_handler;
pub mod completion;
pub mod coordinator;
pub mod job;
pub mod launcher;
pub mod listener;
pub mod worker;

pub use bootstrap::BatchSystem;
pub use broker_consumer::{partition_run_token, BrokerConsumer};
pub use channel_handler::ChannelPartitionHandler;
pub use completion::{CompletionTracker, CompletionSummary};
pub use coordinator::JobCoordinator;
pub use job::JobDefinition;
pub use launcher::{JobLauncher, TriggerResponse};
pub use listener::ListenerHandle;
pub use worker::{execute_partition_step, ChunkWorker, PartitionWorker};
