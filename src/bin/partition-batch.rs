//! # Partition Batch CLI
//!
//! Runs the demo partitioned jobs against any dispatch strategy and validates
//! configuration files.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use partition_batch::chunk::{ChunkPipeline, ItemWriter};
use partition_batch::config::ConfigManager;
use partition_batch::dispatch::DispatchStrategy;
use partition_batch::logging::init_structured_logging;
use partition_batch::orchestration::{BatchSystem, ChunkWorker, JobDefinition, PartitionWorker};
use partition_batch::partition::partition_key_space;
use partition_batch::sample::{
    simple_person_job, simple_person_worker, FaultInjectingWorker, FullNameProcessor, InMemoryTable,
    LoggingItemWriter, Person, PersonAfterProcess, SyntheticReaderFactory, TableWriter,
    UppercaseProcessor,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const JOB_NAME: &str = "partitionJob";

#[derive(Parser)]
#[command(name = "partition-batch")]
#[command(about = "Run partitioned batch jobs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration directory (default: $PARTITION_BATCH_CONFIG_DIR or ./config)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Environment overlay to load (default: detected from the environment)
    #[arg(short, long, global = true)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch one partitioned job and print its status
    Run {
        /// Dispatch strategy (overrides configuration)
        #[arg(short, long)]
        strategy: Option<DispatchStrategy>,

        /// Number of keys to process, starting at the configured minimum key
        #[arg(long, default_value_t = 10)]
        extent: i64,

        /// Number of partitions (overrides configuration)
        #[arg(short, long)]
        grid_size: Option<i64>,

        /// Items per chunk (overrides configuration)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Demo job to run
        #[arg(long, value_enum, default_value_t = DemoJob::People)]
        job: DemoJob,

        /// Fail this partition index to exercise failure handling
        #[arg(long)]
        fail_partition: Option<u32>,

        /// How long to wait for broker partition jobs, in seconds
        #[arg(long, default_value_t = 30)]
        wait_seconds: u64,
    },

    /// Load the configuration, validate it and print it with secrets masked
    ValidateConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DemoJob {
    /// Join first and last names of rows read page by page
    People,
    /// Uppercase five generated items per partition
    Synthetic,
    /// The person job over the whole table as a single partition
    Simple,
}

#[tokio::main]
async fn main() {
    init_structured_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::ValidateConfig => validate_config(cli.config_dir, cli.environment),
        Commands::Run {
            strategy,
            extent,
            grid_size,
            chunk_size,
            job,
            fail_partition,
            wait_seconds,
        } => {
            run(RunArgs {
                config_dir: cli.config_dir,
                environment: cli.environment,
                strategy,
                extent,
                grid_size,
                chunk_size,
                job,
                fail_partition,
                wait: Duration::from_secs(wait_seconds),
            })
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "❌ partition-batch failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

struct RunArgs {
    config_dir: Option<PathBuf>,
    environment: Option<String>,
    strategy: Option<DispatchStrategy>,
    extent: i64,
    grid_size: Option<i64>,
    chunk_size: Option<usize>,
    job: DemoJob,
    fail_partition: Option<u32>,
    wait: Duration,
}

fn load_manager(config_dir: Option<PathBuf>, environment: Option<String>) -> anyhow::Result<Arc<ConfigManager>> {
    let environment = environment.unwrap_or_else(ConfigManager::detect_environment);
    ConfigManager::load_from_directory_with_env(config_dir, &environment)
        .context("failed to load configuration")
}

fn validate_config(config_dir: Option<PathBuf>, environment: Option<String>) -> anyhow::Result<()> {
    let manager = load_manager(config_dir, environment)?;
    manager.config().validate().context("configuration is invalid")?;

    println!("Configuration OK");
    println!("  environment: {}", manager.environment());
    println!("  directory:   {}", manager.config_directory().display());
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let manager = load_manager(args.config_dir, args.environment)?;
    let mut config = manager.config().clone();
    if let Some(strategy) = args.strategy {
        config = config.with_strategy(strategy);
    }
    if let Some(grid_size) = args.grid_size {
        config = config.with_grid_size(grid_size);
    }
    if let Some(chunk_size) = args.chunk_size {
        config = config.with_chunk_size(chunk_size);
    }

    let pipeline = ChunkPipeline::new(config.chunk.chunk_size)?;
    let min_key = config.partitioning.min_key;
    let people = || {
        Arc::new(InMemoryTable::from_rows((0..args.extent.max(0)).map(|offset| {
            let id = min_key + offset;
            (id, Person::new(id, format!("First{id}"), format!("Last{id}")))
        })))
    };

    let (job, worker, people_output): (
        JobDefinition,
        Arc<dyn PartitionWorker>,
        Option<Arc<TableWriter<PersonAfterProcess>>>,
    ) = match args.job {
        DemoJob::People => {
            let table = people();
            let output: Arc<TableWriter<PersonAfterProcess>> = Arc::new(TableWriter::new());
            let sink: Arc<dyn ItemWriter<PersonAfterProcess>> = output.clone();
            let worker: ChunkWorker<Person, PersonAfterProcess> = ChunkWorker::new(
                Arc::new(table.reader_factory()),
                Arc::new(FullNameProcessor),
                sink,
                pipeline,
            );
            (
                JobDefinition::from_config(JOB_NAME, args.extent, &config.partitioning),
                Arc::new(worker) as Arc<dyn PartitionWorker>,
                Some(output),
            )
        }
        DemoJob::Synthetic => {
            let worker: ChunkWorker<String, String> = ChunkWorker::new(
                Arc::new(SyntheticReaderFactory::default()),
                Arc::new(UppercaseProcessor),
                Arc::new(LoggingItemWriter::new()),
                pipeline,
            );
            (
                JobDefinition::from_config(JOB_NAME, args.extent, &config.partitioning),
                Arc::new(worker) as Arc<dyn PartitionWorker>,
                None,
            )
        }
        DemoJob::Simple => {
            let table = people();
            let output: Arc<TableWriter<PersonAfterProcess>> = Arc::new(TableWriter::new());
            let worker = simple_person_worker(&table, output.clone())?;
            (
                simple_person_job(&table),
                Arc::new(worker) as Arc<dyn PartitionWorker>,
                Some(output),
            )
        }
    };

    let worker: Arc<dyn PartitionWorker> = match args.fail_partition {
        Some(partition) => Arc::new(FaultInjectingWorker::new(worker).fail_partition(partition)),
        None => worker,
    };

    let key_space = job.key_space().key_space().await?;
    let plan = partition_key_space(key_space, job.grid_size())?;
    for range in plan.iter() {
        info!(range = %range, empty = range.is_empty(), "🗺️ Planned partition");
    }

    let strategy = config.dispatch.strategy;
    let wait_poll = config.broker.poll_interval();
    let job_name = job.name().to_string();
    let mut system = BatchSystem::bootstrap(config, worker, vec![job]).await?;

    let response = system.launcher().run(&job_name).await;
    println!("{response}");

    if strategy == DispatchStrategy::Broker {
        if let Some(run_token) = response.run_token.as_deref() {
            let expected = plan.dispatchable().len();
            match system
                .completion_tracker()
                .wait_for(run_token, expected, wait_poll, args.wait)
                .await
            {
                Ok(summary) => println!(
                    "Partition jobs: {} completed, {} failed",
                    summary.completed, summary.failed
                ),
                Err(e) => println!("Partition jobs still outstanding: {e}"),
            }
        }
    }

    if let Some(writer) = people_output {
        println!("Rows written: {}", writer.len());
    }

    system.shutdown().await;
    Ok(())
}
