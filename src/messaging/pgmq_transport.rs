//! # PostgreSQL Message Queue Transport (pgmq-rs)
//!
//! Cross-process transport for the broker strategy and for channel dispatch between
//! processes. Enabled with the `pgmq` feature.

use async_trait::async_trait;
use pgmq::PGMQueue;
use serde_json::Value;
use tracing::{debug, info};

use super::errors::{MessagingError, MessagingResult};
use super::transport::{MessageTransport, ReceivedMessage};

#[derive(Debug, Clone)]
pub struct PgmqTransport {
    pgmq: PGMQueue,
}

impl PgmqTransport {
    /// Create new transport using connection string
    pub async fn connect(database_url: &str) -> MessagingResult<Self> {
        info!("🚀 Connecting to pgmq using pgmq-rs crate");

        let pgmq = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| MessagingError::configuration("pgmq", e.to_string()))?;

        info!("✅ Connected to pgmq using pgmq-rs");
        Ok(Self { pgmq })
    }

    /// Create new transport using existing connection pool
    pub async fn new_with_pool(pool: sqlx::PgPool) -> Self {
        let pgmq = PGMQueue::new_with_pool(pool).await;
        info!("✅ pgmq transport created with shared pool");
        Self { pgmq }
    }
}

#[async_trait]
impl MessageTransport for PgmqTransport {
    async fn ensure_queue(&self, queue: &str) -> MessagingResult<()> {
        debug!("📋 Creating queue: {}", queue);
        self.pgmq
            .create(queue)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "create", e.to_string()))
    }

    async fn send(&self, queue: &str, payload: Value) -> MessagingResult<i64> {
        let message_id = self
            .pgmq
            .send(queue, &payload)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "send", e.to_string()))?;

        debug!(queue = %queue, message_id = message_id, "📤 PGMQ: Message sent");
        Ok(message_id)
    }

    async fn receive(
        &self,
        queue: &str,
        limit: usize,
        visibility_timeout_seconds: i32,
    ) -> MessagingResult<Vec<ReceivedMessage>> {
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        let messages = self
            .pgmq
            .read_batch::<Value>(queue, Some(visibility_timeout_seconds), limit)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "read", e.to_string()))?
            .unwrap_or_default();

        Ok(messages
            .into_iter()
            .map(|message| ReceivedMessage {
                id: message.msg_id,
                queue: queue.to_string(),
                payload: message.message,
                read_count: message.read_ct,
            })
            .collect())
    }

    async fn ack(&self, queue: &str, message_id: i64) -> MessagingResult<()> {
        self.pgmq
            .delete(queue, message_id)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "delete", e.to_string()))?;
        Ok(())
    }

    async fn drop_queue(&self, queue: &str) -> MessagingResult<()> {
        self.pgmq
            .destroy(queue)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "destroy", e.to_string()))
    }

    fn transport_type(&self) -> &'static str {
        "pgmq"
    }
}
