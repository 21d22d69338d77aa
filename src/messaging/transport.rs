//! # Message Transport
//!
//! One send/receive capability behind both message-mediated dispatch strategies.
//! The in-memory variant backs the channel strategy inside one process; the pgmq
//! variant (feature `pgmq`) carries envelopes between processes.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::Instant;

use super::errors::MessagingResult;

/// Message claimed from a queue
///
/// The message stays invisible to other receivers until its visibility timeout expires
/// or it is acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub id: i64,
    pub queue: String,
    pub payload: Value,
    /// Number of times the message has been handed out, this delivery included
    pub read_count: i32,
}

#[async_trait]
pub trait MessageTransport: Send + Sync + Debug {
    /// Create the queue if it does not exist yet
    async fn ensure_queue(&self, queue: &str) -> MessagingResult<()>;

    /// Enqueue a JSON payload, returning the transport's message id
    async fn send(&self, queue: &str, payload: Value) -> MessagingResult<i64>;

    /// Claim up to `limit` visible messages without waiting
    async fn receive(
        &self,
        queue: &str,
        limit: usize,
        visibility_timeout_seconds: i32,
    ) -> MessagingResult<Vec<ReceivedMessage>>;

    /// Remove a processed message
    async fn ack(&self, queue: &str, message_id: i64) -> MessagingResult<()>;

    /// Drop a queue and everything in it
    async fn drop_queue(&self, queue: &str) -> MessagingResult<()>;

    /// Claim messages, polling until at least one arrives or `max_wait` elapses
    ///
    /// Returns an empty batch on timeout.
    async fn receive_wait(
        &self,
        queue: &str,
        limit: usize,
        visibility_timeout_seconds: i32,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> MessagingResult<Vec<ReceivedMessage>> {
        let deadline = Instant::now() + max_wait;
        loop {
            let messages = self
                .receive(queue, limit, visibility_timeout_seconds)
                .await?;
            if !messages.is_empty() {
                return Ok(messages);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    /// Short identifier for logs
    fn transport_type(&self) -> &'static str;
}
