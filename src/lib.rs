#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Rewards Batch
//!
//! Partitioned, chunk-oriented batch engine that turns a daily transaction file into
//! loyalty reward events.
//!
//! ## Overview
//!
//! A run splits the input file into disjoint line ranges, processes the ranges on a
//! bounded pool of concurrent workers, and commits transformed records to a sink in
//! fixed-size chunks, one transaction per chunk. Malformed lines and failed chunks are
//! skipped against a per-run budget; transient storage failures are retried first.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Partitioner, reader, transformer, writer, fault policy, worker pool
//! - [`sink`] - In-memory and PostgreSQL reward sinks
//! - [`models`] - Transactions, reward events and partitions
//! - [`config`] - YAML configuration with environment overrides
//! - [`scheduler`] - Daily run planning
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and event helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rewards_batch::config::RewardsBatchConfig;
//! use rewards_batch::orchestration::{RunRequest, StepOrchestrator};
//! use rewards_batch::sink::InMemoryRewardSink;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(InMemoryRewardSink::new());
//! let orchestrator = StepOrchestrator::new(&RewardsBatchConfig::default(), sink.clone());
//!
//! let report = orchestrator
//!     .run(RunRequest::new("input/transactions-2024-05-01", "2024-05-02"))
//!     .await?;
//! println!("{}: {} rewards written", report.status, report.outcome.records_written);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod scheduler;
pub mod sink;

pub use config::{ConfigManager, RewardsBatchConfig};
pub use error::{BatchError, Result};
pub use models::{LineFormat, Partition, RewardEvent, Transaction};
pub use orchestration::{
    FaultPolicy, PartitionOutcome, RunOutcome, RunReport, RunRequest, RunStatus,
    StepOrchestrator, WorkerPool,
};
pub use scheduler::DailyRunPlanner;
pub use sink::{InMemoryRewardSink, RewardSink};
#[cfg(feature = "postgres")]
pub use sink::PostgresRewardSink;
