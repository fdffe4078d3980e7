//! # Rewards Batch Configuration
//!
//! YAML-backed configuration for the batch engine. A single `rewards-batch.yaml` holds the
//! base values and optional `development`, `test` and `production` sections that are
//! deep-merged over them for the active environment.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rewards_batch::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let job = &manager.config().job;
//! println!("partition size {} / chunk size {}", job.partition_size, job.chunk_size);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::defaults;
use crate::models::LineFormat;
use crate::orchestration::fault_policy::{FaultPolicyConfig, RetryBackoff, SkipBudgetScope};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RewardsBatchConfig {
    pub job: JobConfig,
    pub fault_tolerance: FaultToleranceConfig,
    pub database: DatabaseConfig,
    pub schedule: ScheduleConfig,
}

/// Partitioning, chunking and concurrency of a run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct JobConfig {
    pub partition_size: u64,
    pub chunk_size: usize,
    pub max_concurrency: usize,
    pub delimiter: char,
    pub timestamp_format: String,
    /// Cancel running partitions between chunks once any partition fails fatally
    pub abort_in_flight_on_fatal: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            partition_size: defaults::PARTITION_SIZE,
            chunk_size: defaults::CHUNK_SIZE,
            max_concurrency: defaults::MAX_CONCURRENCY,
            delimiter: defaults::FIELD_DELIMITER,
            timestamp_format: defaults::TIMESTAMP_FORMAT.to_string(),
            abort_in_flight_on_fatal: false,
        }
    }
}

impl JobConfig {
    pub fn line_format(&self) -> LineFormat {
        LineFormat {
            delimiter: self.delimiter,
            timestamp_format: self.timestamp_format.clone(),
        }
    }
}

/// Skip and retry budgets
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FaultToleranceConfig {
    pub skip_limit: u64,
    pub retry_limit: u32,
    pub skip_budget_scope: SkipBudgetScope,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
    pub backoff_jitter_factor: f64,
}

impl Default for FaultToleranceConfig {
    fn default() -> Self {
        Self {
            skip_limit: defaults::SKIP_LIMIT,
            retry_limit: defaults::RETRY_LIMIT,
            skip_budget_scope: SkipBudgetScope::Shared,
            backoff_base_ms: defaults::BACKOFF_BASE_MS,
            backoff_max_ms: defaults::BACKOFF_MAX_MS,
            backoff_multiplier: defaults::BACKOFF_MULTIPLIER,
            backoff_jitter_factor: defaults::BACKOFF_JITTER_FACTOR,
        }
    }
}

impl FaultToleranceConfig {
    pub fn backoff(&self) -> RetryBackoff {
        RetryBackoff {
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
            multiplier: self.backoff_multiplier,
            jitter_factor: self.backoff_jitter_factor,
        }
    }

    pub fn policy_config(&self) -> FaultPolicyConfig {
        FaultPolicyConfig {
            skip_limit: self.skip_limit,
            retry_limit: self.retry_limit,
            scope: self.skip_budget_scope,
            backoff: self.backoff(),
        }
    }
}

/// PostgreSQL sink connection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; `${VAR}` references are expanded at load time
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub table: String,
    /// Create the reward table on startup if it is missing
    pub ensure_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: defaults::DATABASE_MAX_CONNECTIONS,
            acquire_timeout_seconds: 30,
            table: defaults::REWARD_EVENTS_TABLE.to_string(),
            ensure_schema: false,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

/// Where the daily trigger looks for input files
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub input_directory: PathBuf,
    pub file_prefix: String,
    /// Informational; the timer that launches runs lives outside the process
    pub cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            input_directory: PathBuf::from(defaults::INPUT_DIRECTORY),
            file_prefix: defaults::INPUT_FILE_PREFIX.to_string(),
            cron: "0 0 2 * * *".to_string(),
        }
    }
}

impl RewardsBatchConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.job.partition_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "job.partition_size",
                "0",
                "partition size must be greater than 0",
            ));
        }

        if self.job.chunk_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "job.chunk_size",
                "0",
                "chunk size must be greater than 0",
            ));
        }

        if self.job.max_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "job.max_concurrency",
                "0",
                "max concurrency must be greater than 0",
            ));
        }

        if self.job.delimiter.is_whitespace() || self.job.delimiter == '"' {
            return Err(ConfigurationError::invalid_value(
                "job.delimiter",
                format!("{:?}", self.job.delimiter),
                "delimiter must be a visible character other than a double quote",
            ));
        }

        if self.job.timestamp_format.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "job.timestamp_format",
                "job configuration",
            ));
        }

        if self.fault_tolerance.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "fault_tolerance.backoff_multiplier",
                self.fault_tolerance.backoff_multiplier.to_string(),
                "multiplier must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.fault_tolerance.backoff_jitter_factor) {
            return Err(ConfigurationError::invalid_value(
                "fault_tolerance.backoff_jitter_factor",
                self.fault_tolerance.backoff_jitter_factor.to_string(),
                "jitter factor must be between 0.0 and 1.0",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool size must be greater than 0",
            ));
        }

        Ok(())
    }
}
