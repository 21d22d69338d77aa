//! # Batch Configuration
//!
//! Typed configuration for partitioning, chunking and the three dispatch strategies.
//!
//! Values come from `config/partition-batch.toml`, an optional
//! `config/partition-batch.<environment>.toml` overlay, and finally
//! `PARTITION_BATCH__<SECTION>__<KEY>` environment variables (see [`ConfigManager`]).
//! Every field has a default, so an empty or missing file yields a runnable setup.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::defaults;
use crate::dispatch::DispatchStrategy;

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub partitioning: PartitioningConfig,
    pub chunk: ChunkConfig,
    pub dispatch: DispatchConfig,
    pub local_pool: LocalPoolConfig,
    pub channel: ChannelConfig,
    pub broker: BrokerConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitioningConfig {
    pub grid_size: i64,
    /// Lower bound used when a job derives its key space from an extent
    pub min_key: i64,
}

impl Default for PartitioningConfig {
    fn default() -> Self {
        Self {
            grid_size: defaults::GRID_SIZE,
            min_key: defaults::MIN_KEY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub chunk_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub strategy: DispatchStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalPoolConfig {
    /// Upper bound on concurrently running partitions; unset means one task per partition
    pub max_concurrency: Option<usize>,
    /// Partitions still running after this long are marked FAILED
    pub partition_timeout_ms: Option<u64>,
}

impl LocalPoolConfig {
    pub fn partition_timeout(&self) -> Option<Duration> {
        self.partition_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub request_queue: String,
    /// Each run replies on `<reply_queue_prefix>.<run_token>`
    pub reply_queue_prefix: String,
    pub reply_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Partitions a channel handler runs at once
    pub handler_concurrency: usize,
    pub visibility_timeout_seconds: i32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            request_queue: defaults::REQUEST_QUEUE.to_string(),
            reply_queue_prefix: defaults::REPLY_QUEUE_PREFIX.to_string(),
            reply_timeout_ms: defaults::REPLY_TIMEOUT_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            handler_concurrency: defaults::LISTENER_CONCURRENCY,
            visibility_timeout_seconds: defaults::VISIBILITY_TIMEOUT_SECONDS,
        }
    }
}

impl ChannelConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reply_queue(&self, run_token: &str) -> String {
        format!("{}.{}", self.reply_queue_prefix, run_token)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub topic: String,
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    pub consumer_concurrency: usize,
    pub visibility_timeout_seconds: i32,
    /// PostgreSQL URL for the pgmq transport; unset keeps the broker in-process
    pub database_url: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            topic: defaults::BROKER_TOPIC.to_string(),
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            batch_size: defaults::LISTENER_BATCH_SIZE,
            consumer_concurrency: defaults::LISTENER_CONCURRENCY,
            visibility_timeout_seconds: defaults::VISIBILITY_TIMEOUT_SECONDS,
            database_url: None,
        }
    }
}

impl BrokerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl BatchConfig {
    /// Set dispatch strategy
    pub fn with_strategy(mut self, strategy: DispatchStrategy) -> Self {
        self.dispatch.strategy = strategy;
        self
    }

    /// Set requested partition count
    pub fn with_grid_size(mut self, grid_size: i64) -> Self {
        self.partitioning.grid_size = grid_size;
        self
    }

    /// Set items per commit
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk.chunk_size = chunk_size;
        self
    }

    /// Set the channel strategy's reply timeout
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.channel.reply_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the local pool's per-partition timeout
    pub fn with_partition_timeout(mut self, timeout: Duration) -> Self {
        self.local_pool.partition_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.partitioning.grid_size < 1 {
            return Err(ConfigurationError::invalid_value(
                "partitioning.grid_size",
                self.partitioning.grid_size,
                "must be at least 1",
            ));
        }

        if self.chunk.chunk_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "chunk.chunk_size",
                self.chunk.chunk_size,
                "must be at least 1",
            ));
        }

        if self.local_pool.max_concurrency == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "local_pool.max_concurrency",
                0,
                "must be at least 1 when set",
            ));
        }

        if self.local_pool.partition_timeout_ms == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "local_pool.partition_timeout_ms",
                0,
                "must be greater than 0 when set",
            ));
        }

        Self::require_name("channel.request_queue", &self.channel.request_queue)?;
        Self::require_name("channel.reply_queue_prefix", &self.channel.reply_queue_prefix)?;
        Self::require_positive("channel.reply_timeout_ms", self.channel.reply_timeout_ms)?;
        Self::require_positive("channel.poll_interval_ms", self.channel.poll_interval_ms)?;
        Self::require_positive(
            "channel.handler_concurrency",
            self.channel.handler_concurrency as u64,
        )?;

        Self::require_name("broker.topic", &self.broker.topic)?;
        Self::require_positive("broker.poll_interval_ms", self.broker.poll_interval_ms)?;
        Self::require_positive("broker.batch_size", self.broker.batch_size as u64)?;
        Self::require_positive(
            "broker.consumer_concurrency",
            self.broker.consumer_concurrency as u64,
        )?;

        if self.broker.visibility_timeout_seconds < 0 || self.channel.visibility_timeout_seconds < 0 {
            return Err(ConfigurationError::invalid_value(
                "visibility_timeout_seconds",
                self.broker
                    .visibility_timeout_seconds
                    .min(self.channel.visibility_timeout_seconds),
                "must not be negative",
            ));
        }

        if let Some(url) = &self.broker.database_url {
            if url.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "broker.database_url",
                    "broker configuration (unset it to use the in-process transport)",
                ));
            }
        }

        Self::require_positive("events.channel_capacity", self.events.channel_capacity as u64)?;

        Ok(())
    }

    fn require_name(field: &str, value: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                field,
                "batch configuration",
            ));
        }
        Ok(())
    }

    fn require_positive(field: &str, value: u64) -> ConfigResult<()> {
        if value == 0 {
            return Err(ConfigurationError::invalid_value(
                field,
                value,
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}
