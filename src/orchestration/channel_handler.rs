//! # Channel Partition Handler
//!
//! Worker side of the channel strategy. Listens on the request queue, runs each
//! partition through a [`PartitionWorker`] and answers on the envelope's `replyTo`
//! queue with a [`ReplyEnvelope`].
//!
//! When the envelope's step execution is in the shared store the handler persists its
//! transitions there. Otherwise it runs the partition against a transient step built
//! from the envelope and only the reply carries the result back.

use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::listener::ListenerHandle;
use super::worker::{execute_partition_step, PartitionWorker};
use crate::config::ChannelConfig;
use crate::constants::worker_step_name;
use crate::error::BatchResult;
use crate::events::EventPublisher;
use crate::messaging::{DispatchEnvelope, MessageTransport, ReceivedMessage, ReplyEnvelope};
use crate::models::StepExecution;
use crate::state_machine::LifecycleEvent;
use crate::store::ExecutionStateStore;

#[derive(Debug, Clone)]
pub struct ChannelPartitionHandler {
    transport: Arc<dyn MessageTransport>,
    store: Arc<dyn ExecutionStateStore>,
    worker: Arc<dyn PartitionWorker>,
    publisher: EventPublisher,
    config: ChannelConfig,
}

impl ChannelPartitionHandler {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        store: Arc<dyn ExecutionStateStore>,
        worker: Arc<dyn PartitionWorker>,
        publisher: EventPublisher,
        config: ChannelConfig,
    ) -> Self {
        Self {
            transport,
            store,
            worker,
            publisher,
            config,
        }
    }

    /// Start listening on the request queue
    pub async fn start(self: Arc<Self>) -> BatchResult<ListenerHandle> {
        self.transport.ensure_queue(&self.config.request_queue).await?;
        info!(
            queue = %self.config.request_queue,
            concurrency = self.config.handler_concurrency,
            transport = self.transport.transport_type(),
            "🎧 CHANNEL_HANDLER: Listening for partition requests"
        );

        let handler = Arc::clone(&self);
        Ok(ListenerHandle::spawn("channel-partition-handler", move |shutdown| {
            handler.listen(shutdown)
        }))
    }

    async fn listen(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.handler_concurrency.max(1)));
        let mut in_flight = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.transport.receive_wait(
                    &self.config.request_queue,
                    self.config.handler_concurrency.max(1),
                    self.config.visibility_timeout_seconds,
                    self.config.poll_interval(),
                    self.config.poll_interval() * 10,
                ) => received,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(error = %e, "⚠️ CHANNEL_HANDLER: Receive failed");
                    tokio::time::sleep(self.config.poll_interval()).await;
                    continue;
                }
            };

            for message in messages {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let handler = Arc::clone(&self);
                in_flight.spawn(async move {
                    handler.handle_message(message).await;
                    drop(permit);
                });
            }

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "💥 CHANNEL_HANDLER: Request task panicked");
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "💥 CHANNEL_HANDLER: Request task panicked");
            }
        }
    }

    /// Process one request message and send its reply
    pub async fn handle_message(&self, message: ReceivedMessage) {
        let queue = message.queue.clone();
        let message_id = message.id;

        match DispatchEnvelope::from_json(message.payload) {
            Ok(envelope) => self.handle_envelope(envelope).await,
            Err(e) => error!(message_id = message_id, error = %e, "❌ CHANNEL_HANDLER: Discarding malformed request"),
        }

        if let Err(e) = self.transport.ack(&queue, message_id).await {
            warn!(message_id = message_id, error = %e, "⚠️ CHANNEL_HANDLER: Request ack failed");
        }
    }

    async fn handle_envelope(&self, envelope: DispatchEnvelope) {
        let (Some(step_execution_id), Some(reply_to)) =
            (envelope.step_execution_id, envelope.reply_to.clone())
        else {
            error!(
                partition = envelope.partition_number,
                "❌ CHANNEL_HANDLER: Request carries no reply address"
            );
            return;
        };

        debug!(
            partition = envelope.partition_number,
            step_id = step_execution_id,
            "📥 CHANNEL_HANDLER: Partition request received"
        );

        let finished = match self.store.get_step_execution(step_execution_id).await {
            Ok(Some(step)) if step.status.is_terminal() => {
                warn!(step_id = step.id, "⚠️ CHANNEL_HANDLER: Step already finished, replaying result");
                step
            }
            Ok(Some(step)) => {
                let snapshot = step.clone();
                match execute_partition_step(self.worker.as_ref(), self.store.as_ref(), &self.publisher, step).await {
                    Ok(step) => step,
                    Err(e) => failed_copy(snapshot, e.to_string()),
                }
            }
            _ => self.execute_transient(&envelope, step_execution_id).await,
        };

        let reply = ReplyEnvelope::from_step(&envelope.run_token, envelope.partition_number, &finished);
        let sent = match reply.to_json() {
            Ok(payload) => self.transport.send(&reply_to, payload).await.map(|_| ()),
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => debug!(
                partition = envelope.partition_number,
                status = %finished.status,
                "📤 CHANNEL_HANDLER: Reply sent"
            ),
            Err(e) => error!(
                partition = envelope.partition_number,
                reply_to = %reply_to,
                error = %e,
                "❌ CHANNEL_HANDLER: Reply not sent"
            ),
        }
    }

    async fn execute_transient(&self, envelope: &DispatchEnvelope, step_execution_id: i64) -> StepExecution {
        let range = envelope.range();
        let mut step = StepExecution::for_partition(0, &worker_step_name(&envelope.job_name), &range);
        step.id = step_execution_id;

        if let Err(e) = step.transition(LifecycleEvent::Start) {
            return failed_copy(step, e.to_string());
        }
        let mut finished = self.worker.execute(step).await;
        if !finished.status.is_terminal() {
            if let Err(e) = finished.transition(LifecycleEvent::fail_with_error(
                "worker returned without finishing the step",
            )) {
                error!(step_id = finished.id, error = %e, "❌ CHANNEL_HANDLER: Could not mark step failed");
            }
        }
        finished
    }
}

fn failed_copy(mut step: StepExecution, reason: String) -> StepExecution {
    if step.status == crate::state_machine::BatchStatus::Starting {
        if let Err(e) = step.transition(LifecycleEvent::Start) {
            warn!(step_id = step.id, error = %e, "⚠️ CHANNEL_HANDLER: Could not start step before failing it");
        }
    }
    if let Err(e) = step.transition(LifecycleEvent::fail_with_error(reason)) {
        error!(step_id = step.id, error = %e, "❌ CHANNEL_HANDLER: Could not mark step failed");
    }
    step
}
