//! # Rewards Batch Runner
//!
//! Runs one batch: loads configuration, picks the input file (explicitly or yesterday's
//! file via the daily planner), executes the run and reports its status.
//!
//! Exit codes: 0 when the run completed (with or without skips), 1 when it failed or was
//! rejected as a duplicate, 2 when it could not be started.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use rewards_batch::config::ConfigManager;
use rewards_batch::logging;
use rewards_batch::orchestration::{RunReport, RunRequest, StepOrchestrator};
use rewards_batch::scheduler::DailyRunPlanner;
use rewards_batch::sink::{InMemoryRewardSink, RewardSink};
use rewards_batch::BatchError;

#[derive(Parser)]
#[command(name = "rewards-batch")]
#[command(about = "Convert a transaction file into loyalty reward events")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Transaction file to process (default: yesterday's file from the schedule settings)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Unique id of this run (default: today's date for planned runs, a UUID otherwise)
    #[arg(long)]
    run_id: Option<String>,

    /// Directory containing rewards-batch.yaml (default: ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Environment section to apply (development, test, production)
    #[arg(short, long)]
    environment: Option<String>,

    /// Keep rewards in memory instead of writing them to the database
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

enum Finish {
    Report(RunReport),
    Rejected(BatchError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_structured_logging();

    match execute(cli).await {
        Ok(Finish::Report(report)) if report.status.is_success() => ExitCode::SUCCESS,
        Ok(Finish::Report(_)) => ExitCode::from(1),
        Ok(Finish::Rejected(error)) => {
            eprintln!("❌ Run rejected: {error}");
            ExitCode::from(1)
        }
        Err(error) => {
            eprintln!("❌ Failed to start run: {error:#}");
            ExitCode::from(2)
        }
    }
}

async fn execute(cli: Cli) -> Result<Finish> {
    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);

    // An explicit directory must contain a configuration file
    let manager = if cli.config_dir.is_some() {
        ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &environment)
    } else {
        ConfigManager::load_or_default_with_env(None, &environment)
    }
    .context("loading configuration")?;
    let config = manager.config();

    let request = match (cli.input, cli.run_id) {
        (Some(input), Some(run_id)) => RunRequest::new(input, run_id),
        (Some(input), None) => RunRequest::with_generated_id(input),
        (None, run_id) => {
            let planned = DailyRunPlanner::from_config(&config.schedule).plan_today();
            match run_id {
                Some(run_id) => RunRequest::new(planned.input_file, run_id),
                None => planned,
            }
        }
    };

    let sink = build_sink(config, cli.dry_run).await?;
    let orchestrator = StepOrchestrator::new(config, sink);

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received - cancelling run between chunks");
            shutdown.cancel();
        }
    });

    info!(
        run_id = %request.run_id,
        input_file = %request.input_file.display(),
        environment = %environment,
        dry_run = cli.dry_run,
        "🚀 Starting rewards batch run"
    );

    let report = match orchestrator.run(request).await {
        Ok(report) => report,
        Err(error @ BatchError::DuplicateRun { .. }) => return Ok(Finish::Rejected(error)),
        Err(error) => return Err(error).context("running batch"),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(Finish::Report(report))
}

async fn build_sink(
    config: &rewards_batch::RewardsBatchConfig,
    dry_run: bool,
) -> Result<Arc<dyn RewardSink>> {
    if dry_run {
        return Ok(Arc::new(InMemoryRewardSink::new()));
    }

    connect_database(config).await
}

#[cfg(feature = "postgres")]
async fn connect_database(
    config: &rewards_batch::RewardsBatchConfig,
) -> Result<Arc<dyn RewardSink>> {
    let sink = rewards_batch::sink::PostgresRewardSink::connect(&config.database)
        .await
        .context("connecting to the reward database")?;
    if config.database.ensure_schema {
        sink.ensure_schema()
            .await
            .context("creating the reward table")?;
    }
    Ok(Arc::new(sink))
}

#[cfg(not(feature = "postgres"))]
async fn connect_database(
    _config: &rewards_batch::RewardsBatchConfig,
) -> Result<Arc<dyn RewardSink>> {
    anyhow::bail!("built without the `postgres` feature; use --dry-run")
}

fn print_summary(report: &RunReport) {
    let outcome = &report.outcome;
    println!("Run {} ({})", report.run_id, report.input_file);
    println!("  status:      {}", report.status);
    println!(
        "  partitions:  {} total, {} succeeded, {} failed, {} cancelled, {} not started",
        outcome.partitions_total,
        outcome.partitions_succeeded,
        outcome.partitions_failed,
        outcome.partitions_cancelled,
        outcome.partitions_not_started
    );
    println!(
        "  records:     {} read, {} written, {} discarded, {} skipped",
        outcome.records_read,
        outcome.records_written,
        outcome.records_discarded,
        outcome.skipped_count
    );
    println!(
        "  chunks:      {} committed, {} discarded",
        outcome.chunks_committed, outcome.chunks_discarded
    );
    println!("  concurrency: peak {}", outcome.peak_concurrency);
    println!("  duration:    {} ms", report.duration_ms);
}
