//! # Channel Dispatch
//!
//! Request/reply fan-out over a [`MessageTransport`]. The master creates every
//! partition step execution up front, sends one envelope per partition on the request
//! queue and then waits on a reply queue dedicated to the run. Replies are correlated by
//! run token and partition number.
//!
//! Partitions without a reply when the reply timeout expires are marked FAILED with a
//! "correlation lost" exit message; the dispatch itself still returns their steps.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::{DispatchRequest, DispatchStrategy, ExecutionOutcome, PartitionDispatcher};
use crate::config::ChannelConfig;
use crate::constants::events;
use crate::error::{BatchError, BatchResult};
use crate::events::EventPublisher;
use crate::logging::log_dispatch_operation;
use crate::messaging::{DispatchEnvelope, MessageTransport, ReplyEnvelope};
use crate::models::StepExecution;
use crate::orchestration::worker::{fail_unfinished_step, publish_step_outcome};
use crate::state_machine::{BatchStatus, LifecycleEvent};
use crate::store::ExecutionStateStore;

#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    transport: Arc<dyn MessageTransport>,
    store: Arc<dyn ExecutionStateStore>,
    publisher: EventPublisher,
    config: ChannelConfig,
}

impl ChannelDispatcher {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        store: Arc<dyn ExecutionStateStore>,
        publisher: EventPublisher,
        config: ChannelConfig,
    ) -> Self {
        Self {
            transport,
            store,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Fold a reply into the master's copy of the partition step
    ///
    /// When the handler shares this store the persisted copy is already terminal and
    /// wins; otherwise the reply's status and counts are applied and written.
    async fn settle_reply(&self, snapshot: StepExecution, reply: &ReplyEnvelope) -> StepExecution {
        let mut step = match self.store.get_step_execution(snapshot.id).await {
            Ok(Some(stored)) if stored.status.is_terminal() => return stored,
            Ok(Some(stored)) => stored,
            _ => snapshot,
        };

        if step.status == BatchStatus::Starting {
            if let Err(e) = step.transition(LifecycleEvent::Start) {
                warn!(step_id = step.id, error = %e, "⚠️ CHANNEL: Could not start step before applying reply");
            }
        }
        step.read_count = reply.read_count;
        step.write_count = reply.write_count;

        let event = match reply.status {
            BatchStatus::Completed => LifecycleEvent::Complete,
            other => LifecycleEvent::fail_with_error(
                reply
                    .exit_message
                    .clone()
                    .unwrap_or_else(|| format!("Partition reported {other}")),
            ),
        };
        if let Err(e) = step.transition(event) {
            error!(step_id = step.id, error = %e, "❌ CHANNEL: Reply could not be applied");
            return step;
        }
        if let Err(e) = self.store.update_step_execution(&step).await {
            error!(step_id = step.id, error = %e, "❌ CHANNEL: Could not persist reply");
        }
        publish_step_outcome(&self.publisher, &step);
        step
    }
}

#[async_trait]
impl PartitionDispatcher for ChannelDispatcher {
    #[instrument(skip_all, fields(job = %request.job.job_name, run_token = %request.job.run_token, partitions = request.partitions.len()))]
    async fn dispatch(&self, request: DispatchRequest) -> BatchResult<ExecutionOutcome> {
        if request.partitions.is_empty() {
            return Ok(ExecutionOutcome::Collected(Vec::new()));
        }

        let started = Instant::now();
        let run_token = request.job.run_token.clone();
        let request_queue = self.config.request_queue.clone();
        let reply_queue = self.config.reply_queue(&run_token);
        let step_name = request.worker_step_name();

        self.transport
            .ensure_queue(&request_queue)
            .await
            .map_err(|e| BatchError::dispatch(None, e.to_string()))?;
        self.transport
            .ensure_queue(&reply_queue)
            .await
            .map_err(|e| BatchError::dispatch(None, e.to_string()))?;

        let mut steps = Vec::with_capacity(request.partitions.len());
        for range in &request.partitions {
            steps.push(
                self.store
                    .create_step_execution(StepExecution::for_partition(
                        request.job.id,
                        &step_name,
                        range,
                    ))
                    .await?,
            );
        }

        let mut pending: HashMap<u32, StepExecution> = HashMap::new();
        let mut results = Vec::with_capacity(steps.len());
        for (range, step) in request.partitions.iter().zip(steps) {
            let envelope = DispatchEnvelope::new(range, &request.job.job_name, &run_token)
                .with_reply(step.id, &reply_queue);

            let sent = match envelope.to_json() {
                Ok(payload) => self.transport.send(&request_queue, payload).await,
                Err(e) => Err(e),
            };

            match sent {
                Ok(message_id) => {
                    debug!(
                        partition = range.index,
                        message_id = message_id,
                        "📤 CHANNEL: Partition request sent"
                    );
                    self.publisher.publish(
                        events::PARTITION_DISPATCHED,
                        json!({
                            "strategy": DispatchStrategy::Channel,
                            "job_execution_id": request.job.id,
                            "step_execution_id": step.id,
                            "partition_number": range.index,
                            "queue": request_queue,
                        }),
                    );
                    pending.insert(range.index, step);
                }
                Err(e) => {
                    error!(partition = range.index, error = %e, "❌ CHANNEL: Partition request not sent");
                    results.push(
                        fail_unfinished_step(
                            self.store.as_ref(),
                            &self.publisher,
                            step,
                            format!("Dispatch failed: {e}"),
                        )
                        .await,
                    );
                }
            }
        }

        let deadline = started + self.config.reply_timeout();
        while !pending.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let messages = match self
                .transport
                .receive_wait(
                    &reply_queue,
                    pending.len(),
                    self.config.visibility_timeout_seconds,
                    self.config.poll_interval(),
                    deadline - now,
                )
                .await
            {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(error = %e, "⚠️ CHANNEL: Reply receive failed, retrying");
                    tokio::time::sleep(self.config.poll_interval()).await;
                    continue;
                }
            };

            for message in messages {
                if let Err(e) = self.transport.ack(&reply_queue, message.id).await {
                    warn!(message_id = message.id, error = %e, "⚠️ CHANNEL: Reply ack failed");
                }

                let reply = match ReplyEnvelope::from_json(message.payload) {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(error = %e, "⚠️ CHANNEL: Discarding malformed reply");
                        continue;
                    }
                };
                if reply.run_token != run_token {
                    warn!(reply_token = %reply.run_token, "⚠️ CHANNEL: Discarding reply for another run");
                    continue;
                }

                match pending.remove(&reply.partition_number) {
                    Some(snapshot) => {
                        self.publisher.publish(
                            events::PARTITION_REPLY_RECEIVED,
                            json!({
                                "job_execution_id": request.job.id,
                                "step_execution_id": reply.step_execution_id,
                                "partition_number": reply.partition_number,
                                "status": reply.status,
                            }),
                        );
                        results.push(self.settle_reply(snapshot, &reply).await);
                    }
                    None => warn!(
                        partition = reply.partition_number,
                        "⚠️ CHANNEL: Duplicate or unknown partition reply"
                    ),
                }
            }
        }

        if !pending.is_empty() {
            let lost = BatchError::CorrelationLost {
                run_token: run_token.clone(),
                missing: pending.len(),
            };
            warn!(error = %lost, "⏰ CHANNEL: Reply timeout elapsed");
            for (partition, snapshot) in pending.drain() {
                results.push(
                    fail_unfinished_step(
                        self.store.as_ref(),
                        &self.publisher,
                        snapshot,
                        format!(
                            "Correlation lost: no reply for partition {partition} within {}ms",
                            self.config.reply_timeout_ms
                        ),
                    )
                    .await,
                );
            }
        }

        if let Err(e) = self.transport.drop_queue(&reply_queue).await {
            warn!(queue = %reply_queue, error = %e, "⚠️ CHANNEL: Could not drop reply queue");
        }

        results.sort_by_key(|step| step.partition_number());
        let outcome = ExecutionOutcome::Collected(results);

        log_dispatch_operation(
            "collect",
            "channel",
            &run_token,
            outcome.partition_count(),
            &outcome.aggregate_status().to_string(),
            Some(started.elapsed().as_millis() as u64),
        );
        info!(
            failed = outcome.failed_partitions().len(),
            "🏁 CHANNEL: All partitions accounted for"
        );

        Ok(outcome)
    }

    fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::Channel
    }
}
