//! In-memory reward sink with scripted failures and write instrumentation.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::RewardSink;
use crate::error::{BatchError, Result};
use crate::models::RewardEvent;

type FailureRule = Box<dyn Fn(&[RewardEvent]) -> Option<BatchError> + Send + Sync>;

/// Stores committed batches in memory
///
/// Failures can be scripted in two ways: [`fail_next`](Self::fail_next) queues errors
/// returned by the next write attempts in order, and [`fail_when`](Self::fail_when)
/// installs a rule consulted for every attempt the queue does not answer.
///
/// ```rust
/// use rewards_batch::error::BatchError;
/// use rewards_batch::sink::{InMemoryRewardSink, RewardSink};
///
/// # tokio_test::block_on(async {
/// let sink = InMemoryRewardSink::new();
/// sink.fail_next(1, BatchError::transient_store("insert", "deadlock detected"));
///
/// assert!(sink.write_batch(&[]).await.is_err());
/// assert!(sink.write_batch(&[]).await.is_ok());
/// assert_eq!(sink.attempts(), 2);
/// # });
/// ```
#[derive(Default)]
pub struct InMemoryRewardSink {
    committed: Mutex<Vec<RewardEvent>>,
    scripted_failures: Mutex<VecDeque<BatchError>>,
    failure_rule: Mutex<Option<FailureRule>>,
    write_delay: Option<Duration>,
    attempts: AtomicU64,
    batches_committed: AtomicU64,
    active_writes: AtomicUsize,
    peak_writes: AtomicUsize,
}

impl std::fmt::Debug for InMemoryRewardSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRewardSink")
            .field("committed", &self.committed.lock().len())
            .field("attempts", &self.attempts())
            .field("batches_committed", &self.batches_committed())
            .finish()
    }
}

impl InMemoryRewardSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every write for `delay` before completing it
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Fail the next `times` write attempts with `error`
    pub fn fail_next(&self, times: usize, error: BatchError) {
        let mut queue = self.scripted_failures.lock();
        queue.extend(std::iter::repeat(error).take(times));
    }

    /// Fail every attempt for which `rule` returns an error
    pub fn fail_when<F>(&self, rule: F)
    where
        F: Fn(&[RewardEvent]) -> Option<BatchError> + Send + Sync + 'static,
    {
        *self.failure_rule.lock() = Some(Box::new(rule));
    }

    /// Write attempts seen so far, failed ones included
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn batches_committed(&self) -> u64 {
        self.batches_committed.load(Ordering::SeqCst)
    }

    /// Highest number of writes observed in flight at the same time
    pub fn peak_concurrent_writes(&self) -> usize {
        self.peak_writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every committed event in commit order
    pub fn events(&self) -> Vec<RewardEvent> {
        self.committed.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.committed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.lock().is_empty()
    }

    fn scripted_failure(&self, events: &[RewardEvent]) -> Option<BatchError> {
        if let Some(error) = self.scripted_failures.lock().pop_front() {
            return Some(error);
        }
        self.failure_rule
            .lock()
            .as_ref()
            .and_then(|rule| rule(events))
    }
}

#[async_trait]
impl RewardSink for InMemoryRewardSink {
    async fn write_batch(&self, events: &[RewardEvent]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let active = self.active_writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_writes.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.scripted_failure(events) {
            Some(error) => Err(error),
            None => {
                self.committed.lock().extend_from_slice(events);
                self.batches_committed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };

        self.active_writes.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
