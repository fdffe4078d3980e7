//! # Step Orchestrator
//!
//! Two-phase driver of a batch run.
//!
//! 1. **Partition**: [`RangePartitioner`] lays out line ranges on a blocking thread. Zero
//!    partitions completes the run immediately.
//! 2. **Dispatch and await**: the [`WorkerPool`] runs one [`PartitionWorker`] per range
//!    and the aggregated [`RunOutcome`] is mapped to a [`RunStatus`].
//!
//! Every run gets a fresh [`FaultPolicy`], so skip budgets never leak between runs. Run
//! ids are tracked for the lifetime of the orchestrator: an id that is running or has
//! completed is rejected, while an id whose run failed may be dispatched again.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::{FaultToleranceConfig, JobConfig, RewardsBatchConfig};
use crate::constants::operations;
use crate::error::{BatchError, Result};
use crate::logging;
use crate::orchestration::fault_policy::{ErrorClassifier, FaultPolicy, StandardErrorClassifier};
use crate::orchestration::partition_worker::PartitionWorker;
use crate::orchestration::partitioner::RangePartitioner;
use crate::orchestration::transformer::{RecordTransformer, RewardCalculator};
use crate::orchestration::types::{RunOutcome, RunReport, RunRequest, RunStatus};
use crate::orchestration::worker_pool::WorkerPool;
use crate::sink::RewardSink;

/// Registry entry for a run id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Running,
    Finished(RunStatus),
}

impl RunState {
    /// Whether a new run with the same id must be rejected
    fn blocks_redispatch(&self) -> bool {
        match self {
            RunState::Running => true,
            RunState::Finished(status) => status.is_success(),
        }
    }
}

pub struct StepOrchestrator {
    job: JobConfig,
    fault_tolerance: FaultToleranceConfig,
    sink: Arc<dyn RewardSink>,
    transformer: Arc<dyn RecordTransformer>,
    classifier: Arc<dyn ErrorClassifier>,
    pool: WorkerPool,
    runs: DashMap<String, RunState>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for StepOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepOrchestrator")
            .field("job", &self.job)
            .field("fault_tolerance", &self.fault_tolerance)
            .field("sink", &self.sink.name())
            .field("classifier", &self.classifier.classifier_name())
            .field("pool", &self.pool)
            .field("runs", &self.runs.len())
            .finish()
    }
}

impl StepOrchestrator {
    pub fn new(config: &RewardsBatchConfig, sink: Arc<dyn RewardSink>) -> Self {
        Self {
            job: config.job.clone(),
            fault_tolerance: config.fault_tolerance.clone(),
            sink,
            transformer: Arc::new(RewardCalculator),
            classifier: Arc::new(StandardErrorClassifier),
            pool: WorkerPool::new(config.job.max_concurrency),
            runs: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn RecordTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Token that cancels every run of this orchestrator between chunks
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Registry state of a run id, if it was ever dispatched
    pub fn run_state(&self, run_id: &str) -> Option<RunState> {
        self.runs.get(run_id).map(|entry| entry.value().clone())
    }

    /// Execute one run to completion
    ///
    /// Only a duplicate run id is returned as an error; every failure of the run itself
    /// is reported through the returned [`RunReport`].
    #[instrument(skip(self, request), fields(run_id = %request.run_id))]
    pub async fn run(&self, request: RunRequest) -> Result<RunReport> {
        self.register(&request.run_id)?;

        let started_at = Utc::now();
        let started = Instant::now();
        let input = request.input_file.display().to_string();

        logging::log_run_operation(
            operations::RUN_STARTED,
            &request.run_id,
            "running",
            Some(&format!("input_file={input}")),
        );

        let outcome = self.execute(&request).await;
        let status = RunStatus::from_outcome(&outcome);

        self.runs
            .insert(request.run_id.clone(), RunState::Finished(status.clone()));

        if let Some(error) = &outcome.fatal_error {
            logging::log_error("step_orchestrator", operations::RUN_FINISHED, error, Some(&input));
        }
        logging::log_run_operation(
            operations::RUN_FINISHED,
            &request.run_id,
            &status.to_string(),
            Some(&format!(
                "partitions={} succeeded={} records_written={} skipped={} peak_concurrency={}",
                outcome.partitions_total,
                outcome.partitions_succeeded,
                outcome.records_written,
                outcome.skipped_count,
                outcome.peak_concurrency
            )),
        );

        Ok(RunReport {
            run_id: request.run_id,
            input_file: input,
            status,
            outcome,
            started_at,
            finished_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn register(&self, run_id: &str) -> Result<()> {
        match self.runs.entry(run_id.to_string()) {
            Entry::Occupied(entry) if entry.get().blocks_redispatch() => {
                logging::log_run_operation(
                    operations::RUN_REJECTED,
                    run_id,
                    "duplicate",
                    Some(&format!("existing_state={:?}", entry.get())),
                );
                Err(BatchError::DuplicateRun {
                    run_id: run_id.to_string(),
                })
            }
            Entry::Occupied(mut entry) => {
                info!(run_id = %run_id, "🔄 Re-dispatching previously failed run");
                entry.insert(RunState::Running);
                Ok(())
            }
            Entry::Vacant(entry) => {
                entry.insert(RunState::Running);
                Ok(())
            }
        }
    }

    async fn execute(&self, request: &RunRequest) -> RunOutcome {
        let partitioner = RangePartitioner::new(&request.input_file, self.job.partition_size);
        let partitions = match tokio::task::spawn_blocking(move || partitioner.partition()).await {
            Ok(Ok(partitions)) => partitions,
            Ok(Err(error)) => return RunOutcome::failed_before_dispatch(error),
            Err(join_error) => {
                return RunOutcome::failed_before_dispatch(BatchError::Io {
                    path: request.input_file.display().to_string(),
                    reason: format!("partitioning task failed: {join_error}"),
                })
            }
        };

        logging::log_run_operation(
            operations::PARTITIONS_CREATED,
            &request.run_id,
            "partitioned",
            Some(&format!("partitions={}", partitions.len())),
        );

        if partitions.is_empty() {
            info!(run_id = %request.run_id, "No data lines - run completes without work");
            return RunOutcome::default();
        }

        let policy = Arc::new(FaultPolicy::with_classifier(
            self.fault_tolerance.policy_config(),
            self.classifier.clone(),
        ));
        let format = self.job.line_format();
        let cancel = self.shutdown.child_token();

        self.pool
            .execute(
                partitions,
                &cancel,
                self.job.abort_in_flight_on_fatal,
                |partition, worker_cancel| {
                    PartitionWorker::new(
                        partition,
                        request.input_file.clone(),
                        format.clone(),
                        self.job.chunk_size,
                        self.transformer.clone(),
                        self.sink.clone(),
                        policy.clone(),
                    )
                    .run(worker_cancel)
                },
            )
            .await
    }
}
