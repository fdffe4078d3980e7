//! # Structured Logging Module
//!
//! Environment-aware structured logging that writes human-readable output to the
//! console and JSON lines to a per-process log file, plus helpers that emit the
//! run, partition, chunk and skip events of a batch run with consistent fields.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::BatchError;
use crate::orchestration::fault_policy::FailureStage;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once; only the first call installs a subscriber. If the log
/// directory cannot be created, logging continues on the console only.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        let log_dir = PathBuf::from("log");
        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");

        let file_layer = match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
                let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
                // Lives for the rest of the process so buffered lines are flushed
                std::mem::forget(guard);
                Some(
                    fmt::layer()
                        .with_writer(file_writer)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(build_filter(&log_level)),
                )
            }
            Err(_) => None,
        };

        let file_enabled = file_layer.is_some();
        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - keeping it");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_dir.join(&log_filename).display(),
            file_enabled = file_enabled,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("REWARDS_BATCH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for run lifecycle events
pub fn log_run_operation(operation: &str, run_id: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        run_id = %run_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 RUN_OPERATION"
    );
}

/// Log structured data for partition lifecycle events
pub fn log_partition_operation(
    operation: &str,
    partition_id: usize,
    start_line: u64,
    end_line: u64,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        partition_id = partition_id,
        start_line = start_line,
        end_line = end_line,
        status = %status,
        details = details,
        "🧩 PARTITION_OPERATION"
    );
}

/// Log structured data for chunk commits, retries and discards
pub fn log_chunk_operation(
    operation: &str,
    partition_id: usize,
    chunk_number: u64,
    records: usize,
    attempt: u32,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        partition_id = partition_id,
        chunk_number = chunk_number,
        records = records,
        attempt = attempt,
        details = details,
        "💾 CHUNK_OPERATION"
    );
}

/// Log a skipped item, whether it was skipped while reading, processing or writing
pub fn log_skip(stage: FailureStage, error: &BatchError, skip_count: u64, skip_limit: u64) {
    tracing::warn!(
        stage = %stage,
        error_code = error.code(),
        error = %error,
        skip_count = skip_count,
        skip_limit = skip_limit,
        "⏭️ Skipped during {}",
        stage
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &BatchError, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error_code = error.code(),
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
