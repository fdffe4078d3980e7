//! # Data Models
//!
//! Records flowing through a batch run: the parsed input [`Transaction`], the
//! derived [`RewardEvent`], and the [`Partition`] line range a worker owns.

pub mod partition;
pub mod reward_event;
pub mod transaction;

pub use partition::Partition;
pub use reward_event::RewardEvent;
pub use transaction::{LineFormat, Transaction};
