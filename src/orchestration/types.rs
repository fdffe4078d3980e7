//! Run-level request, status and outcome types shared by the orchestration components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::BatchError;
use crate::models::Partition;

/// Parameters supplied by the trigger for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub input_file: PathBuf,
    /// Unique per logical run
    pub run_id: String,
}

impl RunRequest {
    pub fn new(input_file: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            input_file: input_file.into(),
            run_id: run_id.into(),
        }
    }

    /// Request with a freshly generated run id
    pub fn with_generated_id(input_file: impl Into<PathBuf>) -> Self {
        Self::new(input_file, uuid::Uuid::new_v4().to_string())
    }
}

/// Final status of a run as reported to the trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithSkips { skipped: u64 },
    Failed { reason: String },
}

impl RunStatus {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        match &outcome.fatal_error {
            Some(error) => RunStatus::Failed {
                reason: error.to_string(),
            },
            None if outcome.skipped_count > 0 => RunStatus::CompletedWithSkips {
                skipped: outcome.skipped_count,
            },
            None => RunStatus::Completed,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, RunStatus::Failed { .. })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::CompletedWithSkips { skipped } => {
                write!(f, "completed with {skipped} skipped")
            }
            RunStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    Completed,
    CompletedWithSkips,
    Failed,
    /// Stopped between chunks by the cancellation signal
    Cancelled,
    /// Never dispatched because the run stopped first
    NotStarted,
}

/// What one partition worker did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionOutcome {
    pub partition: Partition,
    pub status: PartitionStatus,
    pub records_read: u64,
    pub records_written: u64,
    pub records_discarded: u64,
    pub chunks_committed: u64,
    pub chunks_discarded: u64,
    pub skipped: u64,
    pub error: Option<BatchError>,
    pub duration_ms: u64,
}

impl PartitionOutcome {
    pub fn new(partition: Partition, status: PartitionStatus) -> Self {
        Self {
            partition,
            status,
            records_read: 0,
            records_written: 0,
            records_discarded: 0,
            chunks_committed: 0,
            chunks_discarded: 0,
            skipped: 0,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn not_started(partition: Partition) -> Self {
        Self::new(partition, PartitionStatus::NotStarted)
    }

    pub fn panicked(partition: Partition, reason: impl Into<String>) -> Self {
        let mut outcome = Self::new(partition, PartitionStatus::Failed);
        outcome.error = Some(BatchError::WorkerPanicked {
            partition_id: partition.id,
            reason: reason.into(),
        });
        outcome
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            PartitionStatus::Completed | PartitionStatus::CompletedWithSkips
        )
    }

    /// A failure that must stop the run
    pub fn is_fatal(&self) -> bool {
        self.status == PartitionStatus::Failed
    }
}

/// Aggregate of every partition outcome of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub partitions_total: usize,
    pub partitions_succeeded: usize,
    pub partitions_failed: usize,
    pub partitions_cancelled: usize,
    pub partitions_not_started: usize,
    pub skipped_count: u64,
    pub records_read: u64,
    pub records_written: u64,
    pub records_discarded: u64,
    pub chunks_committed: u64,
    pub chunks_discarded: u64,
    pub peak_concurrency: usize,
    pub fatal_error: Option<BatchError>,
    pub partitions: Vec<PartitionOutcome>,
}

impl RunOutcome {
    /// Outcome of a run that stopped before any partition was dispatched
    pub fn failed_before_dispatch(error: BatchError) -> Self {
        Self {
            fatal_error: Some(error),
            ..Self::default()
        }
    }

    /// Fold partition outcomes into run totals
    ///
    /// `fatal_error` is the first fatal error observed; when absent, the first failed
    /// partition's error is used.
    pub fn aggregate(
        partitions: Vec<PartitionOutcome>,
        peak_concurrency: usize,
        fatal_error: Option<BatchError>,
    ) -> Self {
        let mut outcome = Self {
            partitions_total: partitions.len(),
            peak_concurrency,
            ..Self::default()
        };

        for partition in &partitions {
            match partition.status {
                PartitionStatus::Completed | PartitionStatus::CompletedWithSkips => {
                    outcome.partitions_succeeded += 1
                }
                PartitionStatus::Failed => outcome.partitions_failed += 1,
                PartitionStatus::Cancelled => outcome.partitions_cancelled += 1,
                PartitionStatus::NotStarted => outcome.partitions_not_started += 1,
            }
            outcome.skipped_count += partition.skipped;
            outcome.records_read += partition.records_read;
            outcome.records_written += partition.records_written;
            outcome.records_discarded += partition.records_discarded;
            outcome.chunks_committed += partition.chunks_committed;
            outcome.chunks_discarded += partition.chunks_discarded;
        }

        outcome.fatal_error = fatal_error.or_else(|| {
            partitions
                .iter()
                .find(|p| p.is_fatal())
                .and_then(|p| p.error.clone())
        });
        outcome.partitions = partitions;
        outcome
    }

    pub fn is_success(&self) -> bool {
        self.fatal_error.is_none()
    }
}

/// Everything the trigger learns about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub input_file: String,
    pub status: RunStatus,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(
        id: usize,
        status: PartitionStatus,
        skipped: u64,
        written: u64,
    ) -> PartitionOutcome {
        let mut outcome = PartitionOutcome::new(Partition::new(id, 2, 3), status);
        outcome.skipped = skipped;
        outcome.records_written = written;
        outcome
    }

    #[test]
    fn test_status_mapping() {
        let clean = RunOutcome::aggregate(
            vec![finished(0, PartitionStatus::Completed, 0, 250)],
            1,
            None,
        );
        assert_eq!(RunStatus::from_outcome(&clean), RunStatus::Completed);

        let skipped = RunOutcome::aggregate(
            vec![
                finished(0, PartitionStatus::CompletedWithSkips, 3, 247),
                finished(1, PartitionStatus::Completed, 0, 50),
            ],
            2,
            None,
        );
        assert_eq!(
            RunStatus::from_outcome(&skipped),
            RunStatus::CompletedWithSkips { skipped: 3 }
        );
        assert_eq!(skipped.records_written, 297);
        assert_eq!(skipped.partitions_succeeded, 2);

        let failed = RunOutcome::failed_before_dispatch(BatchError::Cancelled);
        assert!(matches!(
            RunStatus::from_outcome(&failed),
            RunStatus::Failed { .. }
        ));
        assert!(!RunStatus::from_outcome(&failed).is_success());
    }

    #[test]
    fn test_aggregate_picks_failed_partition_error() {
        let mut failed = finished(1, PartitionStatus::Failed, 0, 0);
        failed.error = Some(BatchError::parse(9, "bad"));

        let outcome = RunOutcome::aggregate(
            vec![
                finished(0, PartitionStatus::Completed, 0, 10),
                failed,
                PartitionOutcome::not_started(Partition::new(2, 4, 5)),
            ],
            2,
            None,
        );

        assert_eq!(outcome.partitions_failed, 1);
        assert_eq!(outcome.partitions_not_started, 1);
        assert_eq!(outcome.fatal_error, Some(BatchError::parse(9, "bad")));
    }

    #[test]
    fn test_status_serializes_with_tag() {
        let value = serde_json::to_value(RunStatus::CompletedWithSkips { skipped: 2 }).unwrap();
        assert_eq!(value["status"], "completed_with_skips");
        assert_eq!(value["skipped"], 2);
    }
}
