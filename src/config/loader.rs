//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. Sources are layered in
//! order, later ones winning:
//!
//! 1. `<dir>/partition-batch.toml`
//! 2. `<dir>/partition-batch.<environment>.toml`
//! 3. `PARTITION_BATCH__<SECTION>__<KEY>` environment variables
//!
//! Missing files are skipped, so defaults apply for anything left unset.

use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::BatchConfig;

pub const CONFIG_FILE_STEM: &str = "partition-batch";
pub const ENV_PREFIX: &str = "PARTITION_BATCH";
pub const ENV_SEPARATOR: &str = "__";

pub struct ConfigManager {
    config: BatchConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = %environment,
            strategy = %config.dispatch.strategy,
            grid_size = config.partitioning.grid_size,
            chunk_size = config.chunk.chunk_size,
            "⚙️ CONFIG: Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with credentials masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Detect the current environment from environment variables
    pub fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        std::env::var("PARTITION_BATCH_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_and_merge_config(config_directory: &Path, environment: &str) -> ConfigResult<BatchConfig> {
        let base_path = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let environment_path =
            config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        debug!(
            base = %base_path.display(),
            base_exists = base_path.is_file(),
            overlay = %environment_path.display(),
            overlay_exists = environment_path.is_file(),
            "Resolving configuration sources"
        );

        let merged = Config::builder()
            .add_source(File::from(base_path.clone()).required(false))
            .add_source(File::from(environment_path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                ConfigurationError::load_error(config_directory.display().to_string(), e)
            })?;

        merged
            .try_deserialize::<BatchConfig>()
            .map_err(ConfigurationError::type_mismatch)
    }

    /// Mask credential-like fields before configuration reaches the logs
    fn sanitize_config_for_logging(config: &BatchConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "credential", "url"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive && !val.is_null() {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}
