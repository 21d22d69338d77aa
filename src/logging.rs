//! # Structured Logging Module
//!
//! Environment-aware structured logging for job, step and partition activity.
//! Console output is always enabled; a JSON file sink is added when
//! `PARTITION_BATCH_LOG_DIR` names a directory.

use chrono::Utc;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json_console = std::env::var("PARTITION_BATCH_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let console_layer = if json_console {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .json()
                .with_filter(EnvFilter::new(log_level.clone()))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(log_level.clone()))
                .boxed()
        };

        let pid = process::id();
        let mut log_path = None;
        let file_layer = std::env::var("PARTITION_BATCH_LOG_DIR").ok().and_then(|dir| {
            let log_dir = PathBuf::from(dir);
            if let Err(e) = std::fs::create_dir_all(&log_dir) {
                eprintln!("Failed to create log directory {}: {e}", log_dir.display());
                return None;
            }

            let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
            let log_filename = format!("{environment}.{pid}.{timestamp}.log");
            log_path = Some(log_dir.join(&log_filename));

            let file_appender = tracing_appender::rolling::never(&log_dir, log_filename);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            // The writer flushes on drop; the subscriber lives for the whole process.
            std::mem::forget(guard);

            Some(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(log_level.clone())),
            )
        });

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        // Test harnesses and embedding applications may already own the global subscriber
        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = ?log_path.as_ref().map(|p| p.display().to_string()),
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("PARTITION_BATCH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment, honouring an explicit RUST_LOG
fn get_log_level(environment: &str) -> String {
    if let Ok(explicit) = std::env::var("RUST_LOG") {
        return explicit;
    }

    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for job operations
pub fn log_job_operation(
    operation: &str,
    job_execution_id: Option<i64>,
    job_name: Option<&str>,
    run_token: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_execution_id = job_execution_id,
        job_name = job_name,
        run_token = run_token,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 JOB_OPERATION"
    );
}

/// Log structured data for step operations
pub fn log_step_operation(
    operation: &str,
    job_execution_id: Option<i64>,
    step_execution_id: Option<i64>,
    step_name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_execution_id = job_execution_id,
        step_execution_id = step_execution_id,
        step_name = step_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 STEP_OPERATION"
    );
}

/// Log structured data for partition dispatch operations
pub fn log_dispatch_operation(
    operation: &str,
    strategy: &str,
    run_token: &str,
    partition_count: usize,
    status: &str,
    duration_ms: Option<u64>,
) {
    tracing::info!(
        operation = %operation,
        strategy = %strategy,
        run_token = %run_token,
        partition_count = partition_count,
        status = %status,
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "📤 DISPATCH_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
