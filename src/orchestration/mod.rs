//! # Batch Orchestration
//!
//! The partitioned, chunk-oriented engine, leaves first:
//!
//! - [`partitioner`]: line-range partitions covering the data lines of the input file
//! - [`chunk_reader`]: streams and parses the records of one partition
//! - [`transformer`]: pure transaction → reward event mapping
//! - [`chunk_writer`]: buffers events and commits them chunk by chunk
//! - [`fault_policy`]: skip/retry classification and budgets
//! - [`partition_worker`]: read → transform → write loop for one partition
//! - [`worker_pool`]: bounded-concurrency execution of partition workers
//! - [`step_orchestrator`]: partition, dispatch, await, report
//!
//! ## Control Flow
//!
//! ```text
//! StepOrchestrator ──▶ RangePartitioner ──▶ [Partition; n]
//!        │
//!        ▼
//!   WorkerPool ──▶ PartitionWorker × max_concurrency
//!                     │
//!                     ├── ChunkReader ──▶ RecordTransformer ──▶ ChunkWriter ──▶ RewardSink
//!                     └── FaultPolicy (every failure)
//! ```

pub mod chunk_reader;
pub mod chunk_writer;
pub mod fault_policy;
pub mod partition_worker;
pub mod partitioner;
pub mod step_orchestrator;
pub mod transformer;
pub mod types;
pub mod worker_pool;

pub use chunk_reader::ChunkReader;
pub use chunk_writer::{ChunkCommit, ChunkWriter};
pub use fault_policy::{
    ErrorClassifier, FailureStage, FaultClass, FaultDecision, FaultPolicy, FaultPolicyConfig,
    RetryBackoff, SkipBudgetScope, SkipTally, StandardErrorClassifier,
};
pub use partition_worker::PartitionWorker;
pub use partitioner::{compute_partitions, count_lines, RangePartitioner};
pub use step_orchestrator::{RunState, StepOrchestrator};
pub use transformer::{calculate_points, RecordTransformer, RewardCalculator};
pub use types::{
    PartitionOutcome, PartitionStatus, RunOutcome, RunReport, RunRequest, RunStatus,
};
pub use worker_pool::WorkerPool;
