//! # Worker Pool
//!
//! Bounded-concurrency executor for partition workers.
//!
//! ```text
//! partitions ──▶ [Semaphore: max_concurrency] ──▶ spawn(worker) ──▶ PartitionOutcome
//!                        ▲                                  │
//!                        └──── halt dispatch on fatal ◀─────┘
//! ```
//!
//! Partitions are dispatched in order; each dispatch waits for a permit, so at most
//! `max_concurrency` workers run at once. Once any worker reports a fatal outcome no
//! further partition is started. Running workers drain unless the pool was asked to
//! abort them, in which case they are cancelled between chunks. A panicking worker is
//! converted into a failed partition outcome.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::BatchError;
use crate::models::Partition;
use crate::orchestration::types::{PartitionOutcome, PartitionStatus, RunOutcome};

#[derive(Debug)]
pub struct WorkerPool {
    max_concurrency: usize,
    active: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Workers currently executing
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Run one worker per partition and aggregate their outcomes
    ///
    /// `run_partition` builds the worker future for a partition; the token handed to it
    /// is cancelled when `cancel` is, and also on a fatal outcome if
    /// `abort_in_flight_on_fatal` is set.
    pub async fn execute<F, Fut>(
        &self,
        partitions: Vec<Partition>,
        cancel: &CancellationToken,
        abort_in_flight_on_fatal: bool,
        run_partition: F,
    ) -> RunOutcome
    where
        F: Fn(Partition, CancellationToken) -> Fut,
        Fut: Future<Output = PartitionOutcome> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let worker_cancel = cancel.child_token();
        let dispatch_halt = CancellationToken::new();
        let first_fatal: Arc<OnceLock<BatchError>> = Arc::new(OnceLock::new());
        let run_active = Arc::new(AtomicUsize::new(0));
        let run_peak = Arc::new(AtomicUsize::new(0));

        let mut handles: Vec<(Partition, JoinHandle<PartitionOutcome>)> =
            Vec::with_capacity(partitions.len());
        let mut not_started = Vec::new();
        let mut pending = partitions.into_iter();

        while let Some(partition) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = dispatch_halt.cancelled() => None,
                _ = worker_cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            // A permit can be granted in the same poll that a fatal outcome lands
            let Some(permit) = permit.filter(|_| {
                !dispatch_halt.is_cancelled() && !worker_cancel.is_cancelled()
            }) else {
                debug!(
                    partition_id = partition.id,
                    "Dispatch halted - remaining partitions will not start"
                );
                not_started.push(PartitionOutcome::not_started(partition));
                not_started.extend(pending.by_ref().map(PartitionOutcome::not_started));
                break;
            };

            let worker = run_partition(partition, worker_cancel.clone());
            let pool_active = self.active.clone();
            let run_active = run_active.clone();
            let run_peak = run_peak.clone();
            let dispatch_halt = dispatch_halt.clone();
            let worker_cancel = worker_cancel.clone();
            let first_fatal = first_fatal.clone();

            let handle = tokio::spawn(async move {
                pool_active.fetch_add(1, Ordering::SeqCst);
                let now_active = run_active.fetch_add(1, Ordering::SeqCst) + 1;
                run_peak.fetch_max(now_active, Ordering::SeqCst);

                let outcome = match AssertUnwindSafe(worker).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic_error) => {
                        let panic_msg = if let Some(s) = panic_error.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = panic_error.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "Unknown panic".to_string()
                        };
                        error!(
                            partition_id = partition.id,
                            panic_msg = %panic_msg,
                            "💥 Partition worker panicked"
                        );
                        PartitionOutcome::panicked(partition, panic_msg)
                    }
                };

                run_active.fetch_sub(1, Ordering::SeqCst);
                pool_active.fetch_sub(1, Ordering::SeqCst);

                // Halt before the permit is released so the dispatcher cannot reuse it
                if outcome.is_fatal() {
                    if let Some(error) = &outcome.error {
                        let _ = first_fatal.set(error.clone());
                    }
                    dispatch_halt.cancel();
                    if abort_in_flight_on_fatal {
                        worker_cancel.cancel();
                    }
                }
                drop(permit);

                outcome
            });

            handles.push((partition, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len() + not_started.len());
        for (partition, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    warn!(
                        partition_id = partition.id,
                        error = %join_error,
                        "Partition task did not complete"
                    );
                    PartitionOutcome::panicked(partition, join_error.to_string())
                }
            };
            outcomes.push(outcome);
        }
        outcomes.extend(not_started);

        // External cancellation is the run's failure reason when nothing else failed
        let interrupted = cancel.is_cancelled()
            && outcomes.iter().any(|o| {
                matches!(
                    o.status,
                    PartitionStatus::Cancelled | PartitionStatus::NotStarted
                )
            });
        let fatal_error = first_fatal
            .get()
            .cloned()
            .or_else(|| interrupted.then_some(BatchError::Cancelled));

        RunOutcome::aggregate(outcomes, run_peak.load(Ordering::SeqCst), fatal_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn partitions(count: usize) -> Vec<Partition> {
        (0..count)
            .map(|i| Partition::new(i, (i as u64) * 10 + 2, (i as u64) * 10 + 11))
            .collect()
    }

    fn completed(partition: Partition) -> PartitionOutcome {
        let mut outcome = PartitionOutcome::new(partition, PartitionStatus::Completed);
        outcome.records_written = partition.line_count();
        outcome
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_limit() {
        let pool = WorkerPool::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let observed_peak = Arc::new(AtomicUsize::new(0));

        let outcome = pool
            .execute(partitions(20), &CancellationToken::new(), false, |partition, _cancel| {
                let in_flight = in_flight.clone();
                let observed_peak = observed_peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    observed_peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    completed(partition)
                }
            })
            .await;

        assert_eq!(outcome.partitions_total, 20);
        assert_eq!(outcome.partitions_succeeded, 20);
        assert!(observed_peak.load(Ordering::SeqCst) <= 3);
        assert!(outcome.peak_concurrency <= 3);
        assert!(outcome.peak_concurrency >= 1);
        assert_eq!(pool.active_workers(), 0);
    }

    #[tokio::test]
    async fn test_fatal_outcome_stops_dispatch() {
        let pool = WorkerPool::new(1);
        let cancel = CancellationToken::new();

        let outcome = pool
            .execute(partitions(5), &cancel, false, |partition, _cancel| async move {
                if partition.id == 1 {
                    let mut failed = PartitionOutcome::new(partition, PartitionStatus::Failed);
                    failed.error = Some(BatchError::parse(12, "bad"));
                    failed
                } else {
                    completed(partition)
                }
            })
            .await;

        assert_eq!(outcome.partitions_succeeded, 1);
        assert_eq!(outcome.partitions_failed, 1);
        assert_eq!(outcome.partitions_not_started, 3);
        assert_eq!(outcome.fatal_error, Some(BatchError::parse(12, "bad")));
        assert_eq!(outcome.partitions.len(), 5);
    }

    #[tokio::test]
    async fn test_panicking_worker_becomes_failed_outcome() {
        let pool = WorkerPool::new(2);
        let cancel = CancellationToken::new();

        let outcome = pool
            .execute(partitions(1), &cancel, false, |partition, _cancel| async move {
                if partition.id == 0 {
                    panic!("boom");
                }
                completed(partition)
            })
            .await;

        assert_eq!(outcome.partitions_failed, 1);
        assert!(matches!(
            outcome.fatal_error,
            Some(BatchError::WorkerPanicked { partition_id: 0, ref reason }) if reason == "boom"
        ));
    }

    #[tokio::test]
    async fn test_external_cancellation_before_dispatch() {
        let pool = WorkerPool::new(2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = pool
            .execute(partitions(3), &cancel, false, |partition, _cancel| async move {
                completed(partition)
            })
            .await;

        assert_eq!(outcome.partitions_not_started, 3);
        assert_eq!(outcome.fatal_error, Some(BatchError::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abort_in_flight_cancels_running_workers() {
        let pool = WorkerPool::new(2);
        let run_cancel = CancellationToken::new();

        let outcome = pool
            .execute(partitions(2), &run_cancel, true, |partition, cancel| async move {
                if partition.id == 0 {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let mut failed = PartitionOutcome::new(partition, PartitionStatus::Failed);
                    failed.error = Some(BatchError::NumericOverflow {
                        customer_id: "C-1".to_string(),
                        amount: "1e40".to_string(),
                    });
                    failed
                } else {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let mut cancelled =
                                PartitionOutcome::new(partition, PartitionStatus::Cancelled);
                            cancelled.error = Some(BatchError::Cancelled);
                            cancelled
                        }
                        _ = tokio::time::sleep(Duration::from_secs(5)) => completed(partition),
                    }
                }
            })
            .await;

        assert_eq!(outcome.partitions_failed, 1);
        assert_eq!(outcome.partitions_cancelled, 1);
        assert!(matches!(
            outcome.fatal_error,
            Some(BatchError::NumericOverflow { .. })
        ));
    }
}
