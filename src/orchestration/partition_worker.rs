//! # Partition Worker
//!
//! Drives one partition through read → transform → write, one chunk at a time, and
//! reports every failure to the shared [`FaultPolicy`]. The cancellation token is checked
//! before each chunk starts, never inside one, so a cancelled partition never leaves a
//! half-built chunk behind.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constants::operations;
use crate::error::{BatchError, Result};
use crate::logging;
use crate::models::{LineFormat, Partition};
use crate::orchestration::chunk_reader::ChunkReader;
use crate::orchestration::chunk_writer::ChunkWriter;
use crate::orchestration::fault_policy::{FailureStage, FaultDecision, FaultPolicy, SkipTally};
use crate::orchestration::transformer::RecordTransformer;
use crate::orchestration::types::{PartitionOutcome, PartitionStatus};
use crate::sink::RewardSink;

/// Everything a worker needs for one partition; consumed by [`PartitionWorker::run`]
pub struct PartitionWorker {
    partition: Partition,
    input_file: PathBuf,
    format: LineFormat,
    chunk_size: usize,
    transformer: Arc<dyn RecordTransformer>,
    sink: Arc<dyn RewardSink>,
    policy: Arc<FaultPolicy>,
}

impl PartitionWorker {
    pub fn new(
        partition: Partition,
        input_file: impl Into<PathBuf>,
        format: LineFormat,
        chunk_size: usize,
        transformer: Arc<dyn RecordTransformer>,
        sink: Arc<dyn RewardSink>,
        policy: Arc<FaultPolicy>,
    ) -> Self {
        Self {
            partition,
            input_file: input_file.into(),
            format,
            chunk_size,
            transformer,
            sink,
            policy,
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Process the whole partition; failures end up in the returned outcome
    pub async fn run(self, cancel: CancellationToken) -> PartitionOutcome {
        let started = Instant::now();
        let partition = self.partition;

        logging::log_partition_operation(
            operations::PARTITION_STARTED,
            partition.id,
            partition.start_line,
            partition.end_line,
            "running",
            None,
        );

        let mut tally = SkipTally::default();
        let mut writer = ChunkWriter::new(self.sink.clone(), self.chunk_size, partition.id);
        let mut records_read = 0;

        let opened = ChunkReader::open(&self.input_file, partition, self.format.clone()).await;
        let result = match opened {
            Ok(mut reader) => {
                let result = self.process(&mut reader, &mut writer, &mut tally, &cancel).await;
                records_read = reader.lines_read();
                result
            }
            Err(error) => self.report(FailureStage::Read, error, &mut tally),
        };

        let mut outcome = PartitionOutcome::new(partition, PartitionStatus::Completed);
        outcome.records_read = records_read;
        outcome.records_written = writer.records_written();
        outcome.records_discarded = writer.records_discarded();
        outcome.chunks_committed = writer.chunks_committed();
        outcome.chunks_discarded = writer.chunks_discarded();
        outcome.skipped = tally.skipped;
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        outcome.status = match &result {
            Ok(()) if tally.skipped > 0 => PartitionStatus::CompletedWithSkips,
            Ok(()) => PartitionStatus::Completed,
            Err(BatchError::Cancelled) => PartitionStatus::Cancelled,
            Err(_) => PartitionStatus::Failed,
        };
        outcome.error = result.err();

        if let Some(error) = outcome.error.as_ref().filter(|_| outcome.is_fatal()) {
            logging::log_error(
                "partition_worker",
                operations::PARTITION_FINISHED,
                error,
                Some(&partition.to_string()),
            );
        }

        let details = format!(
            "records_read={} records_written={} skipped={} chunks_committed={} duration_ms={}",
            outcome.records_read,
            outcome.records_written,
            outcome.skipped,
            outcome.chunks_committed,
            outcome.duration_ms
        );
        logging::log_partition_operation(
            operations::PARTITION_FINISHED,
            partition.id,
            partition.start_line,
            partition.end_line,
            status_label(outcome.status),
            Some(&details),
        );

        outcome
    }

    async fn process(
        &self,
        reader: &mut ChunkReader,
        writer: &mut ChunkWriter,
        tally: &mut SkipTally,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                debug!(partition_id = self.partition.id, "Cancellation observed between chunks");
                return Err(BatchError::Cancelled);
            }

            let exhausted = self.fill_chunk(reader, writer, tally).await?;
            writer.commit(&self.policy, tally).await?;

            if exhausted {
                return Ok(());
            }
        }
    }

    /// Read and transform until the chunk is full; true once the partition is exhausted
    async fn fill_chunk(
        &self,
        reader: &mut ChunkReader,
        writer: &mut ChunkWriter,
        tally: &mut SkipTally,
    ) -> Result<bool> {
        while !writer.is_full() {
            match reader.next_record().await {
                None => return Ok(true),
                Some(Ok(transaction)) => match self.transformer.transform(&transaction) {
                    Ok(event) => writer.push(event),
                    Err(error) => self.report(FailureStage::Process, error, tally)?,
                },
                Some(Err(error)) => self.report(FailureStage::Read, error, tally)?,
            }
        }
        Ok(false)
    }

    /// Hand a non-retried failure to the policy; `Err` means the partition must stop
    fn report(&self, stage: FailureStage, error: BatchError, tally: &mut SkipTally) -> Result<()> {
        match self.policy.on_failure(stage, error, tally) {
            FaultDecision::Skip { .. } => Ok(()),
            FaultDecision::Fatal(error) => Err(error),
        }
    }
}

fn status_label(status: PartitionStatus) -> &'static str {
    match status {
        PartitionStatus::Completed => "completed",
        PartitionStatus::CompletedWithSkips => "completed_with_skips",
        PartitionStatus::Failed => "failed",
        PartitionStatus::Cancelled => "cancelled",
        PartitionStatus::NotStarted => "not_started",
    }
}
