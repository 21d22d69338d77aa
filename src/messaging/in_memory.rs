//! # In-Memory Transport
//!
//! Process-local queues with visibility timeout semantics. Senders wake waiting
//! receivers through a `Notify`, so `receive_wait` does not spin on the poll interval.
//! Sends only reach queues created through `ensure_queue`; a dropped queue stays gone.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::errors::{MessagingError, MessagingResult};
use super::transport::{MessageTransport, ReceivedMessage};

#[derive(Debug, Clone)]
struct InMemoryMessage {
    id: i64,
    payload: Value,
    read_count: i32,
    visible_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    messages: VecDeque<InMemoryMessage>,
    next_id: i64,
}

#[derive(Debug, Default)]
pub struct InMemoryTransport {
    queues: Mutex<HashMap<String, InMemoryQueue>>,
    arrivals: Notify,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently held by a queue, claimed ones included
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn ensure_queue(&self, queue: &str) -> MessagingResult<()> {
        self.queues.lock().entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn send(&self, queue: &str, payload: Value) -> MessagingResult<i64> {
        let message_id = {
            let mut queues = self.queues.lock();
            let queue_state = queues
                .get_mut(queue)
                .ok_or_else(|| MessagingError::queue_not_found(queue))?;
            queue_state.next_id += 1;
            let message_id = queue_state.next_id;
            queue_state.messages.push_back(InMemoryMessage {
                id: message_id,
                payload,
                read_count: 0,
                visible_at: None,
            });
            message_id
        };

        debug!(queue = %queue, message_id = message_id, "📤 IN_MEMORY: Message enqueued");
        self.arrivals.notify_waiters();
        Ok(message_id)
    }

    async fn receive(
        &self,
        queue: &str,
        limit: usize,
        visibility_timeout_seconds: i32,
    ) -> MessagingResult<Vec<ReceivedMessage>> {
        let mut queues = self.queues.lock();
        let Some(queue_state) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let now = Utc::now();
        let visible_at = now + ChronoDuration::seconds(visibility_timeout_seconds as i64);
        let mut claimed = Vec::new();

        for message in queue_state.messages.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            let is_available = message.visible_at.map(|at| at <= now).unwrap_or(true);
            if is_available {
                message.visible_at = Some(visible_at);
                message.read_count += 1;
                claimed.push(ReceivedMessage {
                    id: message.id,
                    queue: queue.to_string(),
                    payload: message.payload.clone(),
                    read_count: message.read_count,
                });
            }
        }

        Ok(claimed)
    }

    async fn ack(&self, queue: &str, message_id: i64) -> MessagingResult<()> {
        let mut queues = self.queues.lock();
        let queue_state = queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::queue_not_found(queue))?;
        queue_state.messages.retain(|message| message.id != message_id);
        Ok(())
    }

    async fn drop_queue(&self, queue: &str) -> MessagingResult<()> {
        self.queues.lock().remove(queue);
        Ok(())
    }

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
            // Register interest before looking so a concurrent send is not missed
            let arrival = self.arrivals.notified();

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

            // Claimed-but-unacked messages only reappear on expiry, which no send announces
            let wake_after = poll_interval.max(Duration::from_millis(1)).min(deadline - now);
            let _ = tokio::time::timeout(wake_after, arrival).await;
        }
    }

    fn transport_type(&self) -> &'static str {
        "in_memory"
    }
}
