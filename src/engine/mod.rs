//! Pure computation engine for deterministic lot matching.

use crate::domain::{Decimal, Execution, ExecutionId, NewMatch};

pub mod accountant;
pub mod classifier;
pub mod fifo;
pub mod grouping;
pub mod summary;

pub use accountant::{commission_portion, LotAccounting, LotSide};
pub use crate::domain::{days_held, HoldingTerm, LONG_TERM_THRESHOLD_DAYS};
pub use classifier::GainSplit;
pub use fifo::FifoMatcher;
pub use grouping::{group_into_buckets, BucketKey};
pub use summary::RealizedSummary;

/// New remaining quantity for an execution, guarded by the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemainingUpdate {
    pub execution_id: ExecutionId,
    pub expected_version: i64,
    pub remaining_quantity: Decimal,
}

/// Result of matching one bucket, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketOutcome {
    pub key: BucketKey,
    /// In creation order.
    pub matches: Vec<NewMatch>,
    /// One entry per execution whose remaining quantity changed.
    pub updates: Vec<RemainingUpdate>,
    pub executions: Vec<Execution>,
}

impl BucketOutcome {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}
