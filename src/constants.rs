//! # System Constants
//!
//! Well-known names shared between the master side, the workers and the message
//! envelopes: execution context keys, job parameter keys, lifecycle event names and
//! the defaults used when configuration leaves a value out.

/// Keys stored in a partition StepExecution's execution context
pub mod context_keys {
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const PARTITION_NUMBER: &str = "partitionNumber";
    pub const GRID_SIZE: &str = "gridSize";
    pub const PARTITION_COUNT: &str = "partitionCount";
}

/// Keys stored in JobParameters
pub mod params {
    /// Uniqueness token supplied by the trigger
    pub const RUN_TOKEN: &str = "timestamp";
    /// Run token of the master job a broker worker job belongs to
    pub const CORRELATION_TOKEN: &str = "correlation.token";
    pub const PARTITION_NUMBER: &str = "partitionNumber";
    pub const START: &str = "start";
    pub const END: &str = "end";
}

/// Lifecycle events published through the EventPublisher
pub mod events {
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";

    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";

    pub const PARTITION_DISPATCHED: &str = "partition.dispatched";
    pub const PARTITION_REPLY_RECEIVED: &str = "partition.reply_received";
    pub const CHUNK_COMMITTED: &str = "chunk.committed";
}

/// Defaults applied when configuration omits a value
pub mod defaults {
    pub const GRID_SIZE: i64 = 3;
    pub const MIN_KEY: i64 = 1;
    pub const CHUNK_SIZE: usize = 2;
    pub const PAGE_SIZE: usize = 3;
    pub const BROKER_TOPIC: &str = "batch-partitions";
    pub const REQUEST_QUEUE: &str = "partition-requests";
    pub const REPLY_QUEUE_PREFIX: &str = "partition-replies";
    pub const REPLY_TIMEOUT_MS: u64 = 600_000;
    pub const POLL_INTERVAL_MS: u64 = 50;
    pub const LISTENER_BATCH_SIZE: usize = 10;
    pub const LISTENER_CONCURRENCY: usize = 4;
    pub const VISIBILITY_TIMEOUT_SECONDS: i32 = 30;
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
    pub const ENVELOPE_VERSION: u32 = 1;
}

/// Step names derived from a job name
pub fn master_step_name(job_name: &str) -> String {
    format!("{job_name}.master")
}

pub fn worker_step_name(job_name: &str) -> String {
    format!("{job_name}.worker")
}

/// Name of the single-partition job a broker consumer launches for each envelope
pub fn broker_worker_job_name(job_name: &str) -> String {
    format!("{job_name}.partition")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_step_names() {
        assert_eq!(master_step_name("partitionedJob"), "partitionedJob.master");
        assert_eq!(worker_step_name("partitionedJob"), "partitionedJob.worker");
        assert_eq!(
            broker_worker_job_name("partitionedJob"),
            "partitionedJob.partition"
        );
    }
}
