//! Environment variables override file configuration.
//!
//! Lives in its own test binary so the variable cannot leak into other tests.

use partition_batch::config::ConfigManager;
use partition_batch::dispatch::DispatchStrategy;
use std::fs;
use tempfile::TempDir;

#[test]
fn environment_variables_win_over_files() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("partition-batch.toml"),
        "[chunk]\nchunk_size = 5\n\n[dispatch]\nstrategy = \"channel\"\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("partition-batch.staging.toml"),
        "[chunk]\nchunk_size = 50\n",
    )
    .unwrap();

    std::env::set_var("PARTITION_BATCH__CHUNK__CHUNK_SIZE", "7");
    let loaded = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging");
    std::env::remove_var("PARTITION_BATCH__CHUNK__CHUNK_SIZE");

    let manager = loaded.unwrap();
    assert_eq!(manager.config().chunk.chunk_size, 7);
    assert_eq!(manager.config().dispatch.strategy, DispatchStrategy::Channel);
    assert_eq!(manager.environment(), "staging");
}
