//! # Reward Sinks
//!
//! Storage backends for committed reward events. A sink receives one chunk at a time and
//! must either persist all of it or none of it.
//!
//! - [`InMemoryRewardSink`]: process-local storage used for dry runs and tests
//! - [`PostgresRewardSink`]: one PostgreSQL transaction per chunk (feature `postgres`)

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::RewardEvent;

pub use in_memory::InMemoryRewardSink;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRewardSink;

/// Atomic batch insert of reward events
///
/// Called concurrently by every running partition worker. A failed call must leave no
/// row of the batch behind, so the caller can replay the same batch.
#[async_trait]
pub trait RewardSink: Send + Sync {
    async fn write_batch(&self, events: &[RewardEvent]) -> Result<()>;

    /// Get the sink name for identification
    fn name(&self) -> &'static str;
}
