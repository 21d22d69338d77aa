//! Job definitions registered with the coordinator and launcher.

use std::fmt;
use std::sync::Arc;

use crate::config::PartitioningConfig;
use crate::constants::{defaults, master_step_name, worker_step_name};
use crate::partition::{FixedKeySpace, KeySpaceProvider};

/// A partitioned job: a name, a grid size and where its key space comes from
#[derive(Clone)]
pub struct JobDefinition {
    name: String,
    grid_size: i64,
    key_space: Arc<dyn KeySpaceProvider>,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, key_space: Arc<dyn KeySpaceProvider>) -> Self {
        Self {
            name: name.into(),
            grid_size: defaults::GRID_SIZE,
            key_space,
        }
    }

    /// Job over the fixed key space `[min_key, min_key + extent - 1]` using the configured grid
    pub fn from_config(name: impl Into<String>, total_extent: i64, config: &PartitioningConfig) -> Self {
        let key_space = crate::partition::KeySpace::new(
            config.min_key,
            config.min_key.saturating_add(total_extent).saturating_sub(1),
        );
        Self::new(name, Arc::new(FixedKeySpace(key_space))).with_grid_size(config.grid_size)
    }

    pub fn with_grid_size(mut self, grid_size: i64) -> Self {
        self.grid_size = grid_size;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid_size(&self) -> i64 {
        self.grid_size
    }

    pub fn key_space(&self) -> &dyn KeySpaceProvider {
        self.key_space.as_ref()
    }

    pub fn master_step_name(&self) -> String {
        master_step_name(&self.name)
    }

    pub fn worker_step_name(&self) -> String {
        worker_step_name(&self.name)
    }
}

impl fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDefinition")
            .field("name", &self.name)
            .field("grid_size", &self.grid_size)
            .field("key_space", &self.key_space)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_offsets_key_space() {
        let config = PartitioningConfig {
            grid_size: 4,
            min_key: 100,
        };
        let job = JobDefinition::from_config("importJob", 10, &config);

        let key_space = job.key_space().key_space().await.unwrap();
        assert_eq!((key_space.min_key, key_space.max_key), (100, 109));
        assert_eq!(job.grid_size(), 4);
        assert_eq!(job.worker_step_name(), "importJob.worker");
    }
}
