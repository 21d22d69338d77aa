//! # Batch System Bootstrap
//!
//! Composition root: wires the store, transport, dispatcher, coordinator and launcher
//! from a [`BatchConfig`] and starts the listener the configured strategy needs.
//!
//! | Strategy | Dispatcher | Listener started |
//! |----------|------------|------------------|
//! | local | [`LocalPoolDispatcher`] | none |
//! | channel | [`ChannelDispatcher`] | [`ChannelPartitionHandler`] |
//! | broker | [`BrokerDispatcher`] | [`BrokerConsumer`] |

use std::sync::Arc;
use tracing::{info, warn};

use super::broker_consumer::BrokerConsumer;
use super::channel_handler::ChannelPartitionHandler;
use super::completion::CompletionTracker;
use super::coordinator::JobCoordinator;
use super::job::JobDefinition;
use super::launcher::JobLauncher;
use super::listener::ListenerHandle;
use super::worker::PartitionWorker;
use crate::config::{BatchConfig, ConfigManager};
use crate::dispatch::{
    BrokerDispatcher, ChannelDispatcher, DispatchStrategy, LocalPoolDispatcher, PartitionDispatcher,
};
use crate::error::BatchResult;
use crate::events::EventPublisher;
use crate::messaging::{InMemoryTransport, MessageTransport};
use crate::store::{ExecutionStateStore, InMemoryExecutionStateStore};

/// Running batch system and its listeners
#[derive(Debug)]
pub struct BatchSystem {
    config: BatchConfig,
    store: Arc<dyn ExecutionStateStore>,
    transport: Arc<dyn MessageTransport>,
    publisher: EventPublisher,
    coordinator: Arc<JobCoordinator>,
    launcher: Arc<JobLauncher>,
    listeners: Vec<ListenerHandle>,
}

impl BatchSystem {
    /// Bootstrap with an in-memory store and the transport the configuration selects
    pub async fn bootstrap(
        config: BatchConfig,
        worker: Arc<dyn PartitionWorker>,
        jobs: Vec<JobDefinition>,
    ) -> BatchResult<Self> {
        let transport = build_transport(&config).await?;
        Self::bootstrap_with(
            config,
            worker,
            jobs,
            Arc::new(InMemoryExecutionStateStore::new()),
            transport,
        )
        .await
    }

    /// Bootstrap from a loaded [`ConfigManager`]
    pub async fn bootstrap_from_manager(
        manager: &ConfigManager,
        worker: Arc<dyn PartitionWorker>,
        jobs: Vec<JobDefinition>,
    ) -> BatchResult<Self> {
        info!(
            environment = manager.environment(),
            config_directory = %manager.config_directory().display(),
            "🔧 BOOTSTRAP: Using loaded configuration"
        );
        Self::bootstrap(manager.config().clone(), worker, jobs).await
    }

    /// Bootstrap around an injected store and transport
    pub async fn bootstrap_with(
        config: BatchConfig,
        worker: Arc<dyn PartitionWorker>,
        jobs: Vec<JobDefinition>,
        store: Arc<dyn ExecutionStateStore>,
        transport: Arc<dyn MessageTransport>,
    ) -> BatchResult<Self> {
        config.validate()?;

        let strategy = config.dispatch.strategy;
        let publisher = EventPublisher::new(config.events.channel_capacity);

        let dispatcher: Arc<dyn PartitionDispatcher> = match strategy {
            DispatchStrategy::Local => Arc::new(LocalPoolDispatcher::from_config(
                &config.local_pool,
                Arc::clone(&worker),
                Arc::clone(&store),
                publisher.clone(),
            )),
            DispatchStrategy::Channel => Arc::new(ChannelDispatcher::new(
                Arc::clone(&transport),
                Arc::clone(&store),
                publisher.clone(),
                config.channel.clone(),
            )),
            DispatchStrategy::Broker => Arc::new(BrokerDispatcher::new(
                Arc::clone(&transport),
                publisher.clone(),
                config.broker.topic.clone(),
            )),
        };

        let coordinator = Arc::new(JobCoordinator::new(
            Arc::clone(&store),
            dispatcher,
            Arc::clone(&worker),
            publisher.clone(),
        ));
        let launcher = Arc::new(JobLauncher::new(Arc::clone(&coordinator), jobs));

        let mut listeners = Vec::new();
        match strategy {
            DispatchStrategy::Local => {}
            DispatchStrategy::Channel => {
                let handler = Arc::new(ChannelPartitionHandler::new(
                    Arc::clone(&transport),
                    Arc::clone(&store),
                    worker,
                    publisher.clone(),
                    config.channel.clone(),
                ));
                listeners.push(handler.start().await?);
            }
            DispatchStrategy::Broker => {
                let consumer = Arc::new(BrokerConsumer::new(
                    Arc::clone(&transport),
                    Arc::clone(&coordinator),
                    config.broker.clone(),
                ));
                listeners.push(consumer.start().await?);
            }
        }

        info!(
            strategy = %strategy,
            transport = transport.transport_type(),
            jobs = ?launcher.job_names(),
            listeners = listeners.len(),
            "✅ BOOTSTRAP: Batch system ready"
        );

        Ok(Self {
            config,
            store,
            transport,
            publisher,
            coordinator,
            launcher,
            listeners,
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStateStore> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<dyn MessageTransport> {
        &self.transport
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn coordinator(&self) -> &Arc<JobCoordinator> {
        &self.coordinator
    }

    pub fn launcher(&self) -> &Arc<JobLauncher> {
        &self.launcher
    }

    pub fn completion_tracker(&self) -> CompletionTracker {
        CompletionTracker::new(Arc::clone(&self.store))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Stop every listener, waiting for in-flight partitions to finish
    pub async fn shutdown(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        info!(listeners = self.listeners.len(), "🛑 BOOTSTRAP: Shutting down listeners");
        for listener in self.listeners.drain(..) {
            listener.shutdown().await;
        }
    }
}

impl Drop for BatchSystem {
    fn drop(&mut self) {
        if !self.listeners.is_empty() {
            warn!(
                listeners = self.listeners.len(),
                "⚠️ BOOTSTRAP: Batch system dropped without shutdown"
            );
        }
    }
}

#[cfg(feature = "pgmq")]
async fn build_transport(config: &BatchConfig) -> BatchResult<Arc<dyn MessageTransport>> {
    match config.broker.database_url.as_deref() {
        Some(url) if config.dispatch.strategy == DispatchStrategy::Broker => {
            let transport = crate::messaging::PgmqTransport::connect(url).await?;
            Ok(Arc::new(transport))
        }
        _ => Ok(Arc::new(InMemoryTransport::new())),
    }
}

#[cfg(not(feature = "pgmq"))]
async fn build_transport(config: &BatchConfig) -> BatchResult<Arc<dyn MessageTransport>> {
    if config.broker.database_url.is_some() {
        warn!("⚠️ BOOTSTRAP: broker.database_url is set but the pgmq feature is disabled; using the in-memory transport");
    }
    Ok(Arc::new(InMemoryTransport::new()))
}
