//! # Broker Dispatch
//!
//! Fire-and-forget fan-out: one envelope per partition is published to a topic and the
//! dispatch returns as soon as publishing succeeds. Consumers launch their own
//! single-partition job executions; nothing flows back into the master job.
//!
//! Delivery is at-least-once at best. If any publish fails the dispatch fails, and
//! envelopes already published stay published.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::{DispatchRequest, DispatchStrategy, ExecutionOutcome, PartitionDispatcher};
use crate::constants::events;
use crate::error::{BatchError, BatchResult};
use crate::events::EventPublisher;
use crate::logging::log_dispatch_operation;
use crate::messaging::{DispatchEnvelope, MessageTransport};

#[derive(Debug, Clone)]
pub struct BrokerDispatcher {
    transport: Arc<dyn MessageTransport>,
    publisher: EventPublisher,
    topic: String,
}

impl BrokerDispatcher {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        publisher: EventPublisher,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            publisher,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl PartitionDispatcher for BrokerDispatcher {
    #[instrument(skip_all, fields(job = %request.job.job_name, run_token = %request.job.run_token, topic = %self.topic))]
    async fn dispatch(&self, request: DispatchRequest) -> BatchResult<ExecutionOutcome> {
        let started = Instant::now();
        let run_token = request.job.run_token.clone();

        self.transport
            .ensure_queue(&self.topic)
            .await
            .map_err(|e| BatchError::dispatch(None, e.to_string()))?;

        for range in &request.partitions {
            let envelope = DispatchEnvelope::new(range, &request.job.job_name, &run_token);
            let payload = envelope
                .to_json()
                .map_err(|e| BatchError::dispatch(Some(range.index), e.to_string()))?;
            let message_id = self
                .transport
                .send(&self.topic, payload)
                .await
                .map_err(|e| BatchError::dispatch(Some(range.index), e.to_string()))?;

            debug!(
                partition = range.index,
                message_id = message_id,
                "📤 BROKER: Partition published"
            );
            self.publisher.publish(
                events::PARTITION_DISPATCHED,
                json!({
                    "strategy": DispatchStrategy::Broker,
                    "job_execution_id": request.job.id,
                    "partition_number": range.index,
                    "topic": self.topic,
                }),
            );
        }

        let published = request.partitions.len();
        log_dispatch_operation(
            "publish",
            "broker",
            &run_token,
            published,
            "PUBLISHED",
            Some(started.elapsed().as_millis() as u64),
        );
        warn!(
            published = published,
            "📣 BROKER: Partitions published; master completion reflects dispatch only, not partition work"
        );

        Ok(ExecutionOutcome::Dispatched {
            run_token,
            destination: self.topic.clone(),
            published,
        })
    }

    fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::Broker
    }
}
