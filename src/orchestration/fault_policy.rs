//! # Fault Policy
//!
//! Classification of batch failures and enforcement of the per-run skip and retry
//! budgets.
//!
//! ## Overview
//!
//! Every failure a partition worker sees while reading, transforming or writing is
//! routed through one [`FaultPolicy`]. The policy answers two questions:
//!
//! - **Should the raising stage try again?** Only [`FaultClass::Retryable`] errors are
//!   retried, and only up to `retry_limit` times ([`FaultPolicy::should_retry`]).
//! - **Can the run continue?** [`FaultPolicy::on_failure`] turns a skippable failure into
//!   a skip against the budget, or into a fatal decision once the budget is exceeded.
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ BatchError      │────▶│ ErrorClassifier │────▶│ FaultClass      │
//! │ + FailureStage  │     │                 │     │                 │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                          │
//!                                             ┌────────────▼────────────┐
//!                                             │ skip budget (shared or  │
//!                                             │ per partition)          │
//!                                             └────────────┬────────────┘
//!                                                          ▼
//!                                                  FaultDecision
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use rewards_batch::error::BatchError;
//! use rewards_batch::orchestration::fault_policy::{
//!     FailureStage, FaultDecision, FaultPolicy, FaultPolicyConfig, SkipTally,
//! };
//!
//! let policy = FaultPolicy::new(FaultPolicyConfig::default());
//! let mut tally = SkipTally::default();
//!
//! let decision = policy.on_failure(
//!     FailureStage::Read,
//!     BatchError::parse(17, "expected 3 fields, found 2"),
//!     &mut tally,
//! );
//! assert!(matches!(decision, FaultDecision::Skip { skip_count: 1 }));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::FaultToleranceConfig;
use crate::error::BatchError;
use crate::logging;

/// How the engine reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    /// Replaying the same operation may succeed
    Retryable,
    /// The item or chunk can be dropped and counted against the skip budget
    Skippable,
    /// The owning partition stops and the run fails
    Fatal,
}

/// Where in the read → process → write pipeline a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Read,
    Process,
    Write,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Read => write!(f, "read"),
            FailureStage::Process => write!(f, "process"),
            FailureStage::Write => write!(f, "write"),
        }
    }
}

/// Whether the skip budget is counted across the whole run or per partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipBudgetScope {
    #[default]
    Shared,
    PerPartition,
}

/// Outcome of reporting a failure to the policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultDecision {
    /// Drop the item and continue; `skip_count` is the count within the budget scope
    Skip { skip_count: u64 },
    /// Stop the partition with this error
    Fatal(BatchError),
}

/// Trait for error classification strategies
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &BatchError) -> FaultClass;

    /// Get the classifier name for identification
    fn classifier_name(&self) -> &'static str;
}

/// Default classification: parse and non-retryable store failures are skippable,
/// transient store failures are retryable, everything else is fatal
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardErrorClassifier;

impl ErrorClassifier for StandardErrorClassifier {
    fn classify(&self, error: &BatchError) -> FaultClass {
        match error {
            BatchError::TransientStore { .. } => FaultClass::Retryable,
            BatchError::Parse { .. } | BatchError::Store { .. } => FaultClass::Skippable,
            BatchError::Io { .. }
            | BatchError::NumericOverflow { .. }
            | BatchError::SkipLimitExceeded { .. }
            | BatchError::Cancelled
            | BatchError::WorkerPanicked { .. }
            | BatchError::DuplicateRun { .. }
            | BatchError::Configuration { .. } => FaultClass::Fatal,
        }
    }

    fn classifier_name(&self) -> &'static str {
        "StandardErrorClassifier"
    }
}

/// Backoff between attempts of a retried operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Jitter factor (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl RetryBackoff {
    /// No waiting between attempts
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before retry number `retry_number` (1-based)
    pub fn delay_for(&self, retry_number: u32) -> Duration {
        let exponent = i32::try_from(retry_number.saturating_sub(1)).unwrap_or(i32::MAX);
        let mut secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if self.jitter_factor > 0.0 {
            secs *= 1.0 + fastrand::f64() * self.jitter_factor;
        }

        // Saturates to max_delay when the product overflows Duration
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Budgets enforced by a [`FaultPolicy`]
#[derive(Debug, Clone, PartialEq)]
pub struct FaultPolicyConfig {
    pub skip_limit: u64,
    pub retry_limit: u32,
    pub scope: SkipBudgetScope,
    pub backoff: RetryBackoff,
}

impl Default for FaultPolicyConfig {
    fn default() -> Self {
        FaultToleranceConfig::default().policy_config()
    }
}

/// Skips attributed to one partition
///
/// Owned by the partition worker; under [`SkipBudgetScope::PerPartition`] it is also
/// the counter the budget is checked against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipTally {
    pub skipped: u64,
}

/// Skip/retry policy for one run, shared by reference with every partition worker
pub struct FaultPolicy {
    config: FaultPolicyConfig,
    classifier: Arc<dyn ErrorClassifier>,
    shared_skips: AtomicU64,
}

impl fmt::Debug for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultPolicy")
            .field("config", &self.config)
            .field("classifier", &self.classifier.classifier_name())
            .field("shared_skips", &self.shared_skips.load(Ordering::Relaxed))
            .finish()
    }
}

impl FaultPolicy {
    pub fn new(config: FaultPolicyConfig) -> Self {
        Self::with_classifier(config, Arc::new(StandardErrorClassifier))
    }

    pub fn with_classifier(
        config: FaultPolicyConfig,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Self {
        Self {
            config,
            classifier,
            shared_skips: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &FaultPolicyConfig {
        &self.config
    }

    pub fn skip_limit(&self) -> u64 {
        self.config.skip_limit
    }

    pub fn retry_limit(&self) -> u32 {
        self.config.retry_limit
    }

    pub fn classify(&self, error: &BatchError) -> FaultClass {
        self.classifier.classify(error)
    }

    /// Whether the stage that raised `error` should attempt again
    ///
    /// `retries_done` is the number of retries already performed for this operation, so
    /// an operation is attempted at most `retry_limit + 1` times in total.
    pub fn should_retry(&self, error: &BatchError, retries_done: u32) -> bool {
        self.classify(error) == FaultClass::Retryable && retries_done < self.config.retry_limit
    }

    /// Delay before retry number `retry_number` (1-based)
    pub fn retry_delay(&self, retry_number: u32) -> Duration {
        self.config.backoff.delay_for(retry_number)
    }

    /// Report a failure that the raising stage will not retry
    ///
    /// Retryable errors reaching this point have exhausted their retries and are
    /// treated as skippable. A skip that takes the count past `skip_limit` is fatal.
    pub fn on_failure(
        &self,
        stage: FailureStage,
        error: BatchError,
        tally: &mut SkipTally,
    ) -> FaultDecision {
        match self.classify(&error) {
            FaultClass::Fatal => {
                debug!(stage = %stage, error_code = error.code(), "Fatal failure reported");
                FaultDecision::Fatal(error)
            }
            FaultClass::Retryable | FaultClass::Skippable => {
                let skip_count = match self.config.scope {
                    SkipBudgetScope::Shared => self.shared_skips.fetch_add(1, Ordering::SeqCst) + 1,
                    SkipBudgetScope::PerPartition => tally.skipped + 1,
                };

                if skip_count > self.config.skip_limit {
                    return FaultDecision::Fatal(BatchError::SkipLimitExceeded {
                        skip_limit: self.config.skip_limit,
                        skip_count,
                        last_error: error.to_string(),
                    });
                }

                tally.skipped += 1;
                logging::log_skip(stage, &error, skip_count, self.config.skip_limit);
                FaultDecision::Skip { skip_count }
            }
        }
    }
}
