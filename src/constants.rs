//! # System Constants
//!
//! Default operating limits of the reward batch engine and the operation names used
//! in structured log output.

/// Defaults applied when configuration does not override them
pub mod defaults {
    /// Data lines assigned to one partition
    pub const PARTITION_SIZE: u64 = 250;
    /// Records committed together in one transaction
    pub const CHUNK_SIZE: usize = 100;
    /// Partition workers allowed to run at the same time
    pub const MAX_CONCURRENCY: usize = 4;
    /// Skippable failures tolerated per run before it is declared failed
    pub const SKIP_LIMIT: u64 = 10;
    /// Re-attempts of a retryable failure before it is escalated to a skip
    pub const RETRY_LIMIT: u32 = 3;

    pub const FIELD_DELIMITER: char = ',';
    /// ISO-8601 local date-time, fractional seconds optional
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub const BACKOFF_BASE_MS: u64 = 100;
    pub const BACKOFF_MAX_MS: u64 = 5_000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;

    pub const REWARD_EVENTS_TABLE: &str = "reward_events";
    pub const DATABASE_MAX_CONNECTIONS: u32 = 8;

    pub const INPUT_DIRECTORY: &str = "input";
    pub const INPUT_FILE_PREFIX: &str = "transactions";
}

/// Business rule constants for the reward transform
pub mod rewards {
    /// One point is earned per this many currency units
    pub const CURRENCY_UNITS_PER_POINT: i64 = 10;
}

/// Operation names emitted in structured log events
pub mod operations {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const RUN_REJECTED: &str = "run.rejected";
    pub const PARTITIONS_CREATED: &str = "partition.created";
    pub const PARTITION_STARTED: &str = "partition.started";
    pub const PARTITION_FINISHED: &str = "partition.finished";
    pub const CHUNK_COMMITTED: &str = "chunk.committed";
    pub const CHUNK_RETRIED: &str = "chunk.retried";
    pub const CHUNK_DISCARDED: &str = "chunk.discarded";
}
