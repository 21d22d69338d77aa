//! Broker dispatch: publish and return, consumers run partition jobs on their own.

mod common;

use async_trait::async_trait;
use common::{key_copy_worker, sorted};
use partition_batch::config::BrokerConfig;
use partition_batch::constants::{broker_worker_job_name, params};
use partition_batch::dispatch::{BrokerDispatcher, DispatchRequest, ExecutionOutcome, PartitionDispatcher};
use partition_batch::error::BatchError;
use partition_batch::events::EventPublisher;
use partition_batch::messaging::{
    DispatchEnvelope, InMemoryTransport, MessageTransport, MessagingError, MessagingResult,
    ReceivedMessage,
};
use partition_batch::models::{ExecutionContext, JobExecution, JobParameters, StepExecution};
use partition_batch::orchestration::{
    partition_run_token, BrokerConsumer, CompletionTracker, JobCoordinator, JobDefinition, PartitionWorker,
};
use partition_batch::partition::{FixedKeySpace, PartitionRange};
use partition_batch::sample::{FaultInjectingWorker, TableWriter};
use partition_batch::state_machine::BatchStatus;
use partition_batch::store::{ExecutionStateStore, InMemoryExecutionStateStore};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn fast_broker() -> BrokerConfig {
    BrokerConfig {
        poll_interval_ms: 5,
        ..BrokerConfig::default()
    }
}

fn job() -> JobDefinition {
    JobDefinition::new("brokerJob", Arc::new(FixedKeySpace::from_extent(10))).with_grid_size(3)
}

fn coordinator(
    transport: Arc<dyn MessageTransport>,
    store: Arc<InMemoryExecutionStateStore>,
    worker: Arc<dyn PartitionWorker>,
) -> Arc<JobCoordinator> {
    let publisher = EventPublisher::default();
    let dispatcher = BrokerDispatcher::new(transport, publisher.clone(), fast_broker().topic);
    Arc::new(JobCoordinator::new(store, Arc::new(dispatcher), worker, publisher))
}

#[tokio::test]
async fn master_completes_before_slow_consumers_finish() {
    let transport = Arc::new(InMemoryTransport::new());
    let store = Arc::new(InMemoryExecutionStateStore::new());
    let output = Arc::new(TableWriter::new());
    let slow_worker: Arc<dyn PartitionWorker> = Arc::new(
        FaultInjectingWorker::new(key_copy_worker(output.clone(), 2)).with_delay(Duration::from_millis(300)),
    );
    let coordinator = coordinator(transport.clone(), store.clone(), slow_worker);

    let consumer = Arc::new(BrokerConsumer::new(
        transport.clone(),
        Arc::clone(&coordinator),
        fast_broker(),
    ))
    .start()
    .await
    .unwrap();

    let started = Instant::now();
    let master = coordinator
        .launch(&job(), JobParameters::with_run_token("master-1"))
        .await
        .unwrap();

    // Dispatch-completed: the master is done while partitions are still sleeping
    assert_eq!(master.status, BatchStatus::Completed);
    assert!(started.elapsed() < Duration::from_millis(300));
    assert!(output.is_empty());

    let summary = CompletionTracker::new(store.clone())
        .wait_for("master-1", 3, Duration::from_millis(10), Duration::from_secs(10))
        .await
        .unwrap();
    consumer.shutdown().await;

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(sorted(output.written()), (1..=10).collect::<Vec<_>>());

    let partition_jobs = store.find_job_executions_by_correlation("master-1").await.unwrap();
    assert_eq!(partition_jobs.len(), 3);
    for partition_job in &partition_jobs {
        assert_eq!(partition_job.job_name, broker_worker_job_name("brokerJob"));
        assert_ne!(partition_job.run_token, "master-1");
        assert!(partition_job.parameters.partition_range().is_some());
    }

    // The master job never hears about partition results
    let master_steps = store.find_step_executions(master.id).await.unwrap();
    assert_eq!(master_steps.len(), 1);
}

#[tokio::test]
async fn consumer_runs_each_envelope_as_its_own_job() {
    let transport = Arc::new(InMemoryTransport::new());
    let store = Arc::new(InMemoryExecutionStateStore::new());
    let output = Arc::new(TableWriter::new());
    let worker: Arc<dyn PartitionWorker> =
        Arc::new(FaultInjectingWorker::new(key_copy_worker(output.clone(), 2)).fail_partition(1));
    let coordinator = coordinator(transport.clone(), store.clone(), worker);
    let consumer = BrokerConsumer::new(transport.clone(), coordinator, fast_broker());

    let ok = consumer
        .launch(&DispatchEnvelope::new(&PartitionRange::new(1, 3, 0), "brokerJob", "master-2"))
        .await
        .unwrap();
    let failed = consumer
        .launch(&DispatchEnvelope::new(&PartitionRange::new(4, 6, 1), "brokerJob", "master-2"))
        .await
        .unwrap();

    assert_eq!(ok.status, BatchStatus::Completed);
    assert_eq!(failed.status, BatchStatus::Failed);
    assert_eq!(ok.parameters.correlation_token().as_deref(), Some("master-2"));
    assert_eq!(ok.parameters.get_long(params::PARTITION_NUMBER), Some(0));
    assert_eq!(sorted(output.written()), vec![1, 2, 3]);
}

#[tokio::test]
async fn malformed_envelopes_are_acknowledged_and_dropped() {
    let transport = Arc::new(InMemoryTransport::new());
    let store = Arc::new(InMemoryExecutionStateStore::new());
    let worker = key_copy_worker(Arc::new(TableWriter::new()), 2);
    let consumer = BrokerConsumer::new(
        transport.clone(),
        coordinator(transport.clone(), store.clone(), worker),
        fast_broker(),
    );

    let topic = fast_broker().topic;
    transport.ensure_queue(&topic).await.unwrap();
    transport
        .send(&topic, serde_json::json!({"unexpected": true}))
        .await
        .unwrap();
    let message = transport.receive(&topic, 1, 30).await.unwrap().remove(0);

    assert!(consumer.handle_message(message).await.unwrap().is_none());
    assert_eq!(transport.queue_depth(&topic), 0);
    assert_eq!(store.job_count(), 0);
}

#[tokio::test]
async fn redelivered_envelope_runs_its_partition_once() {
    let transport = Arc::new(InMemoryTransport::new());
    let store = Arc::new(InMemoryExecutionStateStore::new());
    let output = Arc::new(TableWriter::new());
    let consumer = BrokerConsumer::new(
        transport.clone(),
        coordinator(transport.clone(), store.clone(), key_copy_worker(output.clone(), 2)),
        fast_broker(),
    );
    let envelope = DispatchEnvelope::new(&PartitionRange::new(1, 3, 0), "brokerJob", "master-6");

    let first = consumer.launch(&envelope).await.unwrap();
    assert_eq!(first.run_token, partition_run_token("master-6", 0));
    assert!(matches!(
        consumer.launch(&envelope).await,
        Err(BatchError::DuplicateRun { .. })
    ));

    // Same envelope delivered again through the topic
    let topic = fast_broker().topic;
    transport.ensure_queue(&topic).await.unwrap();
    transport.send(&topic, envelope.to_json().unwrap()).await.unwrap();
    let message = transport.receive(&topic, 1, 30).await.unwrap().remove(0);
    assert!(consumer.handle_message(message).await.unwrap().is_none());
    assert_eq!(transport.queue_depth(&topic), 0);

    let summary = CompletionTracker::new(store.clone()).summary("master-6").await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.completed, 1);
    // Partition 1 never ran, so two partitions are not settled
    assert!(!summary.is_settled(2));
    assert_eq!(sorted(output.written()), vec![1, 2, 3]);
}

/// Transport whose sends start failing after `healthy_sends`
#[derive(Debug)]
struct FlakyTransport {
    inner: InMemoryTransport,
    healthy_sends: usize,
    sends: AtomicUsize,
}

#[async_trait]
impl MessageTransport for FlakyTransport {
    async fn ensure_queue(&self, queue: &str) -> MessagingResult<()> {
        self.inner.ensure_queue(queue).await
    }

    async fn send(&self, queue: &str, payload: Value) -> MessagingResult<i64> {
        if self.sends.fetch_add(1, Ordering::SeqCst) >= self.healthy_sends {
            return Err(MessagingError::queue_operation(queue, "send", "broker unavailable"));
        }
        self.inner.send(queue, payload).await
    }

    async fn receive(&self, queue: &str, limit: usize, vt: i32) -> MessagingResult<Vec<ReceivedMessage>> {
        self.inner.receive(queue, limit, vt).await
    }

    async fn ack(&self, queue: &str, message_id: i64) -> MessagingResult<()> {
        self.inner.ack(queue, message_id).await
    }

    async fn drop_queue(&self, queue: &str) -> MessagingResult<()> {
        self.inner.drop_queue(queue).await
    }

    fn transport_type(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::test]
async fn any_publish_failure_fails_the_dispatch() {
    let transport = Arc::new(FlakyTransport {
        inner: InMemoryTransport::new(),
        healthy_sends: 1,
        sends: AtomicUsize::new(0),
    });
    let dispatcher = BrokerDispatcher::new(transport.clone(), EventPublisher::default(), "batch-partitions");
    let job = JobExecution::new("brokerJob", "master-3", JobParameters::with_run_token("master-3"));

    let error = dispatcher
        .dispatch(DispatchRequest {
            master_step: StepExecution::new(job.id, "brokerJob.master", ExecutionContext::new()),
            job,
            partitions: vec![
                PartitionRange::new(1, 4, 0),
                PartitionRange::new(5, 8, 1),
                PartitionRange::new(9, 10, 2),
            ],
        })
        .await
        .unwrap_err();

    assert!(matches!(error, BatchError::Dispatch { partition: Some(1), .. }));
    // The first envelope stays published
    assert_eq!(transport.inner.queue_depth("batch-partitions"), 1);
}

#[tokio::test]
async fn publish_failure_fails_the_master_job() {
    let transport = Arc::new(FlakyTransport {
        inner: InMemoryTransport::new(),
        healthy_sends: 0,
        sends: AtomicUsize::new(0),
    });
    let store = Arc::new(InMemoryExecutionStateStore::new());
    let worker = key_copy_worker(Arc::new(TableWriter::new()), 2);
    let coordinator = coordinator(transport, store, worker);

    let master = coordinator
        .launch(&job(), JobParameters::with_run_token("master-4"))
        .await
        .unwrap();

    assert_eq!(master.status, BatchStatus::Failed);
    assert!(master.exit_message.unwrap().contains("broker unavailable"));
}

#[tokio::test]
async fn dispatched_outcome_reports_publish_count() {
    let transport = Arc::new(InMemoryTransport::new());
    let dispatcher = BrokerDispatcher::new(transport.clone(), EventPublisher::default(), "topic-a");
    let job = JobExecution::new("brokerJob", "master-5", JobParameters::with_run_token("master-5"));

    let outcome = dispatcher
        .dispatch(DispatchRequest {
            master_step: StepExecution::new(job.id, "brokerJob.master", ExecutionContext::new()),
            job,
            partitions: vec![PartitionRange::new(1, 5, 0), PartitionRange::new(6, 10, 1)],
        })
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ExecutionOutcome::Dispatched {
            run_token: "master-5".to_string(),
            destination: "topic-a".to_string(),
            published: 2,
        }
    );
    let message = transport.receive("topic-a", 1, 30).await.unwrap().remove(0);
    let envelope = DispatchEnvelope::from_json(message.payload).unwrap();
    assert_eq!((envelope.start, envelope.end, envelope.partition_number), (1, 5, 0));
    assert_eq!(envelope.run_token, "master-5");
}
