//! Store abstraction for executions and realized matches.

use crate::domain::{
    DateRange, Execution, ExecutionId, Match, MatchKind, NewExecution, NewMatch, OwnerId,
};
use crate::engine::{BucketOutcome, RemainingUpdate};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryStore;

/// Which executions a reconciliation run reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Every execution, including fully matched ones.
    All,
    /// Only executions with remaining quantity.
    #[default]
    Unmatched,
}

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("execution {0} was modified concurrently")]
    Conflict(ExecutionId),
    #[error("execution {0} not found")]
    NotFound(ExecutionId),
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("execution rejected: {0}")]
    Rejected(String),
}

/// Checks applied to every execution before a store accepts it.
///
/// A negative quantity cannot satisfy `0 <= remaining <= quantity`. A batch containing one
/// is refused as a whole.
pub(crate) fn check_new_execution(execution: &NewExecution) -> Result<(), StoreError> {
    if execution.quantity.is_negative() {
        return Err(StoreError::Rejected(format!(
            "{} {} {} has negative quantity {}",
            execution.owner, execution.action, execution.symbol, execution.quantity
        )));
    }
    Ok(())
}

/// Unit of atomic persistence: remaining updates plus the matches that caused them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketCommit {
    pub updates: Vec<RemainingUpdate>,
    pub matches: Vec<NewMatch>,
}

impl BucketCommit {
    pub fn from_outcome(outcome: &BucketOutcome) -> Self {
        BucketCommit {
            updates: outcome.updates.clone(),
            matches: outcome.matches.clone(),
        }
    }

    pub fn extend(&mut self, other: BucketCommit) {
        self.updates.extend(other.updates);
        self.matches.extend(other.matches);
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.matches.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub stock: u64,
    pub option: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.stock + self.option
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub purged: PurgeReport,
    pub executions_reset: u64,
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_execution(&self, execution: NewExecution) -> Result<Execution, StoreError>;

    /// Insert a batch in one transaction. Rows whose `import_key` already exists are skipped.
    ///
    /// Returns the number of newly inserted executions.
    async fn insert_executions(&self, executions: &[NewExecution]) -> Result<usize, StoreError>;

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>, StoreError>;

    /// Executions for one owner, or for everyone when `owner` is `None`.
    async fn fetch_executions(
        &self,
        owner: Option<&OwnerId>,
        mode: FetchMode,
    ) -> Result<Vec<Execution>, StoreError>;

    /// Apply one remaining-quantity update.
    ///
    /// # Errors
    /// `Conflict` if the stored version differs from `expected_version`.
    async fn update_remaining(&self, update: &RemainingUpdate) -> Result<(), StoreError>;

    /// Restore remaining = quantity on every execution of `owner`.
    async fn reset_remaining(&self, owner: &OwnerId) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn insert_matches(&self, matches: &[NewMatch]) -> Result<Vec<Match>, StoreError>;

    /// Delete matches of `kind` that reference any execution of `owner`.
    async fn delete_matches(&self, owner: &OwnerId, kind: MatchKind) -> Result<u64, StoreError>;

    async fn matches_for_owner(&self, owner: &OwnerId) -> Result<Vec<Match>, StoreError>;

    /// Matches whose `matched_at` falls in `range`, both ends inclusive.
    async fn matches_between(&self, range: DateRange) -> Result<Vec<Match>, StoreError>;
}

/// Transactional operations spanning both executions and matches.
#[async_trait]
pub trait LedgerStore: ExecutionStore + MatchStore {
    /// Apply every update and insert every match, or change nothing.
    async fn commit_bucket(&self, commit: &BucketCommit) -> Result<Vec<Match>, StoreError>;

    async fn purge_matches(&self, owner: &OwnerId) -> Result<PurgeReport, StoreError>;

    /// Purge matches then restore remaining quantities, atomically.
    async fn reset_owner(&self, owner: &OwnerId) -> Result<ResetReport, StoreError>;
}
