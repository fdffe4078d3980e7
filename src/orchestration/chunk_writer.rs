//! # Chunk Writer
//!
//! Buffers transformed records and commits them to the sink one chunk at a time. A chunk
//! is either committed whole or discarded whole; retries replay the identical batch.

use std::sync::Arc;
use tracing::warn;

use crate::constants::operations;
use crate::error::Result;
use crate::logging;
use crate::models::RewardEvent;
use crate::orchestration::fault_policy::{FailureStage, FaultDecision, FaultPolicy, SkipTally};
use crate::sink::RewardSink;

/// Result of committing the current batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkCommit {
    /// Nothing was buffered
    Empty,
    Committed { records: usize, attempts: u32 },
    /// Counted as one skip; none of its records were stored
    Discarded { records: usize, attempts: u32 },
}

pub struct ChunkWriter {
    sink: Arc<dyn RewardSink>,
    batch: Vec<RewardEvent>,
    chunk_size: usize,
    partition_id: usize,
    chunks_committed: u64,
    chunks_discarded: u64,
    records_written: u64,
    records_discarded: u64,
}

impl std::fmt::Debug for ChunkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkWriter")
            .field("sink", &self.sink.name())
            .field("buffered", &self.batch.len())
            .field("chunk_size", &self.chunk_size)
            .field("partition_id", &self.partition_id)
            .field("chunks_committed", &self.chunks_committed)
            .field("chunks_discarded", &self.chunks_discarded)
            .finish()
    }
}

impl ChunkWriter {
    pub fn new(sink: Arc<dyn RewardSink>, chunk_size: usize, partition_id: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            sink,
            batch: Vec::with_capacity(chunk_size),
            chunk_size,
            partition_id,
            chunks_committed: 0,
            chunks_discarded: 0,
            records_written: 0,
            records_discarded: 0,
        }
    }

    pub fn push(&mut self, event: RewardEvent) {
        self.batch.push(event);
    }

    pub fn is_full(&self) -> bool {
        self.batch.len() >= self.chunk_size
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn chunks_committed(&self) -> u64 {
        self.chunks_committed
    }

    pub fn chunks_discarded(&self) -> u64 {
        self.chunks_discarded
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn records_discarded(&self) -> u64 {
        self.records_discarded
    }

    /// Commit the buffered batch as one atomic write
    ///
    /// Retryable failures replay the same batch up to the policy's retry limit. A chunk
    /// that still fails is reported to the policy as a single write failure; the
    /// returned error means that report was fatal.
    pub async fn commit(
        &mut self,
        policy: &FaultPolicy,
        tally: &mut SkipTally,
    ) -> Result<ChunkCommit> {
        if self.batch.is_empty() {
            return Ok(ChunkCommit::Empty);
        }

        let chunk_number = self.chunks_committed + self.chunks_discarded + 1;
        let records = self.batch.len();
        let mut retries = 0u32;

        let failure = loop {
            match self.sink.write_batch(&self.batch).await {
                Ok(()) => {
                    self.batch.clear();
                    self.chunks_committed += 1;
                    self.records_written += records as u64;
                    logging::log_chunk_operation(
                        operations::CHUNK_COMMITTED,
                        self.partition_id,
                        chunk_number,
                        records,
                        retries + 1,
                        None,
                    );
                    return Ok(ChunkCommit::Committed {
                        records,
                        attempts: retries + 1,
                    });
                }
                Err(error) if policy.should_retry(&error, retries) => {
                    retries += 1;
                    let delay = policy.retry_delay(retries);
                    warn!(
                        partition_id = self.partition_id,
                        chunk_number = chunk_number,
                        retry = retries,
                        retry_limit = policy.retry_limit(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "🔁 Retrying chunk commit"
                    );
                    logging::log_chunk_operation(
                        operations::CHUNK_RETRIED,
                        self.partition_id,
                        chunk_number,
                        records,
                        retries,
                        Some(error.to_string().as_str()),
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(error) => break error,
            }
        };

        // The batch is dropped whatever the policy decides
        self.batch.clear();
        let attempts = retries + 1;

        match policy.on_failure(FailureStage::Write, failure, tally) {
            FaultDecision::Skip { .. } => {
                self.chunks_discarded += 1;
                self.records_discarded += records as u64;
                logging::log_chunk_operation(
                    operations::CHUNK_DISCARDED,
                    self.partition_id,
                    chunk_number,
                    records,
                    attempts,
                    None,
                );
                Ok(ChunkCommit::Discarded { records, attempts })
            }
            FaultDecision::Fatal(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BatchError;
    use crate::orchestration::fault_policy::{FaultPolicyConfig, RetryBackoff, SkipBudgetScope};
    use crate::sink::InMemoryRewardSink;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn policy(skip_limit: u64, retry_limit: u32) -> FaultPolicy {
        FaultPolicy::new(FaultPolicyConfig {
            skip_limit,
            retry_limit,
            scope: SkipBudgetScope::Shared,
            backoff: RetryBackoff::none(),
        })
    }

    fn event(n: u32) -> RewardEvent {
        RewardEvent {
            customer_id: format!("C-{n}"),
            points: 1,
            amount: BigDecimal::from(10),
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    fn filled(sink: Arc<InMemoryRewardSink>, count: u32) -> ChunkWriter {
        let mut writer = ChunkWriter::new(sink, 100, 0);
        for n in 0..count {
            writer.push(event(n));
        }
        writer
    }

    #[tokio::test]
    async fn test_commit_success_clears_batch() {
        let sink = Arc::new(InMemoryRewardSink::new());
        let mut writer = filled(sink.clone(), 3);
        let mut tally = SkipTally::default();

        let result = writer.commit(&policy(10, 3), &mut tally).await.unwrap();
        assert_eq!(result, ChunkCommit::Committed { records: 3, attempts: 1 });
        assert!(writer.is_empty());
        assert_eq!(writer.chunks_committed(), 1);
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_commit_is_noop() {
        let sink = Arc::new(InMemoryRewardSink::new());
        let mut writer = ChunkWriter::new(sink.clone(), 100, 0);
        let mut tally = SkipTally::default();
        assert_eq!(
            writer.commit(&policy(10, 3), &mut tally).await.unwrap(),
            ChunkCommit::Empty
        );
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_on_retry() {
        let sink = Arc::new(InMemoryRewardSink::new());
        sink.fail_next(2, BatchError::transient_store("insert", "deadlock detected"));
        let mut writer = filled(sink.clone(), 5);
        let mut tally = SkipTally::default();

        let result = writer.commit(&policy(10, 3), &mut tally).await.unwrap();
        assert_eq!(result, ChunkCommit::Committed { records: 5, attempts: 3 });
        assert_eq!(sink.len(), 5);
        assert_eq!(tally.skipped, 0);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_discards_chunk_after_limit_plus_one_attempts() {
        let sink = Arc::new(InMemoryRewardSink::new());
        sink.fail_next(10, BatchError::transient_store("insert", "deadlock detected"));
        let mut writer = filled(sink.clone(), 4);
        let mut tally = SkipTally::default();

        let result = writer.commit(&policy(10, 3), &mut tally).await.unwrap();
        assert_eq!(result, ChunkCommit::Discarded { records: 4, attempts: 4 });
        assert_eq!(sink.attempts(), 4);
        assert_eq!(sink.len(), 0);
        assert_eq!(tally.skipped, 1);
        assert_eq!(writer.records_discarded(), 4);
        assert!(writer.is_empty());
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_not_retried() {
        let sink = Arc::new(InMemoryRewardSink::new());
        sink.fail_next(1, BatchError::store("insert", "value too long"));
        let mut writer = filled(sink.clone(), 2);
        let mut tally = SkipTally::default();

        let result = writer.commit(&policy(10, 3), &mut tally).await.unwrap();
        assert_eq!(result, ChunkCommit::Discarded { records: 2, attempts: 1 });
        assert_eq!(sink.attempts(), 1);
    }

    #[tokio::test]
    async fn test_discard_over_budget_is_fatal() {
        let sink = Arc::new(InMemoryRewardSink::new());
        sink.fail_next(1, BatchError::store("insert", "value too long"));
        let mut writer = filled(sink.clone(), 2);
        let mut tally = SkipTally::default();

        let error = writer.commit(&policy(0, 3), &mut tally).await.unwrap_err();
        assert!(matches!(error, BatchError::SkipLimitExceeded { .. }));
    }

    #[test]
    fn test_is_full_at_chunk_size() {
        let mut writer = ChunkWriter::new(Arc::new(InMemoryRewardSink::new()), 2, 0);
        writer.push(event(1));
        assert!(!writer.is_full());
        writer.push(event(2));
        assert!(writer.is_full());
        assert_eq!(writer.len(), 2);
    }
}
