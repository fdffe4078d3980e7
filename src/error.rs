//! # Batch Error Types
//!
//! A single error enum covers every failure the engine can observe. The
//! [`FaultPolicy`](crate::orchestration::fault_policy::FaultPolicy) decides whether a given
//! variant is retried, skipped, or ends the run; the enum itself carries no policy.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchError {
    /// A data line could not be turned into a transaction
    #[error("Parse error at line {line}: {reason}")]
    Parse { line: u64, reason: String },

    /// Storage contention that may succeed if the same transaction is replayed
    #[error("Transient store error during {operation}: {reason}")]
    TransientStore { operation: String, reason: String },

    /// Storage rejected the write and replaying it will not help
    #[error("Store error during {operation}: {reason}")]
    Store { operation: String, reason: String },

    /// The input file could not be opened or read
    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("Points overflow for customer '{customer_id}' with amount {amount}")]
    NumericOverflow { customer_id: String, amount: String },

    #[error("Skip limit {skip_limit} exceeded after {skip_count} skips (last: {last_error})")]
    SkipLimitExceeded {
        skip_limit: u64,
        skip_count: u64,
        last_error: String,
    },

    #[error("Run cancelled before completion")]
    Cancelled,

    #[error("Partition worker {partition_id} panicked: {reason}")]
    WorkerPanicked { partition_id: usize, reason: String },

    #[error("Run '{run_id}' has already been dispatched")]
    DuplicateRun { run_id: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl BatchError {
    pub fn parse(line: u64, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, error: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            reason: error.to_string(),
        }
    }

    pub fn transient_store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransientStore {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Stable short code used in structured log fields
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "PARSE_ERROR",
            Self::TransientStore { .. } => "TRANSIENT_STORE_ERROR",
            Self::Store { .. } => "STORE_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::NumericOverflow { .. } => "NUMERIC_OVERFLOW",
            Self::SkipLimitExceeded { .. } => "SKIP_LIMIT_EXCEEDED",
            Self::Cancelled => "CANCELLED",
            Self::WorkerPanicked { .. } => "WORKER_PANICKED",
            Self::DuplicateRun { .. } => "DUPLICATE_RUN",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let error = BatchError::parse(42, "expected 3 fields, found 2");
        assert_eq!(
            error.to_string(),
            "Parse error at line 42: expected 3 fields, found 2"
        );

        let error = BatchError::transient_store("insert reward_events", "deadlock detected");
        assert!(error.to_string().contains("deadlock detected"));
    }

    #[test]
    fn test_io_constructor_records_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = BatchError::io("/data/transactions.csv", &io);
        match error {
            BatchError::Io { path, reason } => {
                assert_eq!(path, "/data/transactions.csv");
                assert_eq!(reason, "no such file");
            }
            other => panic!("Expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let value = serde_json::to_value(BatchError::Cancelled).unwrap();
        assert_eq!(value["kind"], "cancelled");
        assert_eq!(BatchError::Cancelled.code(), "CANCELLED");
    }
}
