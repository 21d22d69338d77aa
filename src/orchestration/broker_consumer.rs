//! # Broker Consumer
//!
//! Worker side of the broker strategy. Every envelope on the topic becomes its own
//! single-partition job execution whose run token is `<master run token>:<partition>`,
//! with the master's run token as correlation token. Nothing is reported back to the
//! master job.
//!
//! Messages are acknowledged after the partition job finishes. A redelivered envelope
//! maps to the same `(job_name, run_token)` identity, so the store rejects the second
//! launch and the consumer acknowledges and drops it. A partition job left STARTED by a
//! consumer that died is not re-run.

use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::coordinator::JobCoordinator;
use super::listener::ListenerHandle;
use crate::config::BrokerConfig;
use crate::constants::{broker_worker_job_name, params};
use crate::error::{BatchError, BatchResult};
use crate::messaging::{DispatchEnvelope, MessageTransport, ReceivedMessage};
use crate::models::{JobExecution, JobParameters};

#[derive(Debug, Clone)]
pub struct BrokerConsumer {
    transport: Arc<dyn MessageTransport>,
    coordinator: Arc<JobCoordinator>,
    config: BrokerConfig,
}

impl BrokerConsumer {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        coordinator: Arc<JobCoordinator>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            transport,
            coordinator,
            config,
        }
    }

    /// Start consuming the topic
    pub async fn start(self: Arc<Self>) -> BatchResult<ListenerHandle> {
        self.transport.ensure_queue(&self.config.topic).await?;
        info!(
            topic = %self.config.topic,
            concurrency = self.config.consumer_concurrency,
            transport = self.transport.transport_type(),
            "🎧 BROKER_CONSUMER: Listening for partitions"
        );

        let consumer = Arc::clone(&self);
        Ok(ListenerHandle::spawn("broker-consumer", move |shutdown| {
            consumer.consume(shutdown)
        }))
    }

    async fn consume(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.consumer_concurrency.max(1)));
        let mut in_flight = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.transport.receive_wait(
                    &self.config.topic,
                    self.config.batch_size.max(1),
                    self.config.visibility_timeout_seconds,
                    self.config.poll_interval(),
                    self.config.poll_interval() * 10,
                ) => received,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(error = %e, "⚠️ BROKER_CONSUMER: Receive failed");
                    tokio::time::sleep(self.config.poll_interval()).await;
                    continue;
                }
            };

            for message in messages {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let consumer = Arc::clone(&self);
                in_flight.spawn(async move {
                    if let Err(e) = consumer.handle_message(message).await {
                        error!(error = %e, "❌ BROKER_CONSUMER: Partition job not launched");
                    }
                    drop(permit);
                });
            }

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "💥 BROKER_CONSUMER: Partition task panicked");
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "💥 BROKER_CONSUMER: Partition task panicked");
            }
        }
    }

    /// Launch the partition job for one message, acknowledging it afterwards
    ///
    /// Malformed messages and duplicate launches are acknowledged and dropped. Store
    /// failures leave the message for redelivery.
    pub async fn handle_message(&self, message: ReceivedMessage) -> BatchResult<Option<JobExecution>> {
        let result = match DispatchEnvelope::from_json(message.payload) {
            Ok(envelope) => match self.launch(&envelope).await {
                Ok(job) => Ok(Some(job)),
                Err(BatchError::DuplicateRun { job_name, run_token }) => {
                    warn!(job = %job_name, run_token = %run_token, "⚠️ BROKER_CONSUMER: Duplicate partition launch ignored");
                    Ok(None)
                }
                Err(e) => return Err(e),
            },
            Err(e) => {
                error!(message_id = message.id, error = %e, "❌ BROKER_CONSUMER: Discarding malformed envelope");
                Ok(None)
            }
        };

        if let Err(e) = self.transport.ack(&message.queue, message.id).await {
            warn!(message_id = message.id, error = %e, "⚠️ BROKER_CONSUMER: Ack failed");
        }
        result
    }

    /// Run the envelope's partition as its own job execution
    ///
    /// Fails with [`BatchError::DuplicateRun`] when the envelope was already launched.
    pub async fn launch(&self, envelope: &DispatchEnvelope) -> BatchResult<JobExecution> {
        let range = envelope.range();
        let parameters =
            JobParameters::with_run_token(partition_run_token(&envelope.run_token, range.index))
                .with(params::CORRELATION_TOKEN, envelope.run_token.as_str())
                .with(params::PARTITION_NUMBER, range.index)
                .with(params::START, range.start)
                .with(params::END, range.end);

        debug!(
            partition = range.index,
            correlation_token = %envelope.run_token,
            "📥 BROKER_CONSUMER: Launching partition job"
        );

        self.coordinator
            .launch_partition(&broker_worker_job_name(&envelope.job_name), parameters, range)
            .await
    }
}

/// Run token of the partition job launched for one envelope
pub fn partition_run_token(master_run_token: &str, partition_number: u32) -> String {
    format!("{master_run_token}:{partition_number}")
}
