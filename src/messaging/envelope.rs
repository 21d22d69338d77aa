//! # Partition Envelopes
//!
//! Wire format for partitions sent over a transport. The JSON keys are camelCase:
//!
//! ```json
//! {"start": 1, "end": 4, "partitionNumber": 0, "runToken": "1718000000000",
//!  "jobName": "partitionedJob", "sentAt": "2024-06-10T08:00:00Z", "version": 1}
//! ```
//!
//! `stepExecutionId` and `replyTo` are only present on the channel strategy, where the
//! master has already created the partition's step execution and waits for a reply.
//! A missing `version` is read as version 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{MessagingError, MessagingResult};
use crate::constants::defaults;
use crate::models::StepExecution;
use crate::partition::PartitionRange;
use crate::state_machine::BatchStatus;

fn default_version() -> u32 {
    defaults::ENVELOPE_VERSION
}

/// Request to process one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEnvelope {
    pub start: i64,
    pub end: i64,
    pub partition_number: u32,
    pub run_token: String,
    pub job_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_execution_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub sent_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl DispatchEnvelope {
    pub fn new(range: &PartitionRange, job_name: impl Into<String>, run_token: impl Into<String>) -> Self {
        Self {
            start: range.start,
            end: range.end,
            partition_number: range.index,
            run_token: run_token.into(),
            job_name: job_name.into(),
            step_execution_id: None,
            reply_to: None,
            sent_at: Utc::now(),
            version: defaults::ENVELOPE_VERSION,
        }
    }

    /// Attach the master-created step execution and the queue replies go to
    pub fn with_reply(mut self, step_execution_id: i64, reply_to: impl Into<String>) -> Self {
        self.step_execution_id = Some(step_execution_id);
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn range(&self) -> PartitionRange {
        PartitionRange::new(self.start, self.end, self.partition_number)
    }

    pub fn to_json(&self) -> MessagingResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode an envelope, rejecting schema versions newer than this build understands
    pub fn from_json(value: Value) -> MessagingResult<Self> {
        let envelope: Self = serde_json::from_value(value)?;
        if envelope.version > defaults::ENVELOPE_VERSION {
            return Err(MessagingError::UnsupportedVersion {
                version: envelope.version,
                supported: defaults::ENVELOPE_VERSION,
            });
        }
        Ok(envelope)
    }
}

/// Outcome of a partition, sent back by the channel handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub run_token: String,
    pub partition_number: u32,
    pub step_execution_id: i64,
    pub status: BatchStatus,
    pub read_count: u64,
    pub write_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_message: Option<String>,
}

impl ReplyEnvelope {
    pub fn from_step(run_token: impl Into<String>, partition_number: u32, step: &StepExecution) -> Self {
        Self {
            run_token: run_token.into(),
            partition_number,
            step_execution_id: step.id,
            status: step.status,
            read_count: step.read_count,
            write_count: step.write_count,
            exit_message: step.exit_message.clone(),
        }
    }

    pub fn to_json(&self) -> MessagingResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: Value) -> MessagingResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}
