//! Reconciliation runs: fetch executions, match every bucket in memory, then persist.
//!
//! A run never writes before every bucket has matched cleanly. Persistence is either one
//! atomic commit per bucket, with a bounded number in flight, or one commit for the whole run.

use crate::config::Config;
use crate::domain::{now_millis, Match, OwnerId};
use crate::engine::{group_into_buckets, BucketKey, BucketOutcome, FifoMatcher};
use crate::error::ReconcileError;
use crate::store::{BucketCommit, FetchMode, LedgerStore, PurgeReport, ResetReport, StoreError};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::locks::OwnerLocks;

/// How much of a run is persisted atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitScope {
    /// Each bucket commits on its own; independent buckets commit concurrently.
    #[default]
    Bucket,
    /// The whole run commits or nothing does.
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub mode: FetchMode,
    pub commit_scope: CommitScope,
    pub max_parallel_buckets: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            mode: FetchMode::Unmatched,
            commit_scope: CommitScope::Bucket,
            max_parallel_buckets: 4,
        }
    }
}

impl From<&Config> for ReconcileOptions {
    fn from(config: &Config) -> Self {
        Self {
            mode: config.match_mode,
            commit_scope: config.commit_scope,
            max_parallel_buckets: config.max_parallel_buckets,
        }
    }
}

/// Drives fetch, grouping, matching and persistence for a run.
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    options: ReconcileOptions,
    locks: OwnerLocks,
}

impl Reconciler {
    pub fn new(store: Arc<dyn LedgerStore>, options: ReconcileOptions) -> Self {
        Self {
            store,
            options,
            locks: OwnerLocks::new(),
        }
    }

    /// Match every owner. Returns the matches created by this run only.
    pub async fn match_all(&self) -> Result<Vec<Match>, ReconcileError> {
        let _guard = self.locks.system().await;
        self.run(None).await
    }

    /// Match a single owner. Returns the matches created by this run only.
    pub async fn match_owner(&self, owner: &OwnerId) -> Result<Vec<Match>, ReconcileError> {
        let _guard = self.locks.owner(owner).await;
        self.run(Some(owner)).await
    }

    /// Delete every stock and option match of `owner`.
    pub async fn purge_matches(&self, owner: &OwnerId) -> Result<PurgeReport, ReconcileError> {
        let _guard = self.locks.owner(owner).await;
        let report = self.store.purge_matches(owner).await?;
        info!(
            owner = %owner,
            stock = report.stock,
            option = report.option,
            "matches purged"
        );
        Ok(report)
    }

    /// Restore every execution of `owner` to fully unmatched.
    pub async fn reset_remaining_quantity(&self, owner: &OwnerId) -> Result<u64, ReconcileError> {
        let _guard = self.locks.owner(owner).await;
        let reset = self.store.reset_remaining(owner).await?;
        info!(owner = %owner, executions = reset, "remaining quantities reset");
        Ok(reset)
    }

    /// Purge matches and restore remaining quantities as one atomic step.
    pub async fn reset_matched_state(&self, owner: &OwnerId) -> Result<ResetReport, ReconcileError> {
        let _guard = self.locks.owner(owner).await;
        let report = self.store.reset_owner(owner).await?;
        info!(
            owner = %owner,
            purged = report.purged.total(),
            executions = report.executions_reset,
            "matched state reset"
        );
        Ok(report)
    }

    async fn run(&self, owner: Option<&OwnerId>) -> Result<Vec<Match>, ReconcileError> {
        let run_id = Uuid::new_v4();
        let scope = owner.map(|o| o.as_str()).unwrap_or("*").to_string();
        let span = info_span!("reconcile", run_id = %run_id, scope = %scope);
        self.run_inner(owner).instrument(span).await
    }

    async fn run_inner(&self, owner: Option<&OwnerId>) -> Result<Vec<Match>, ReconcileError> {
        let started = Instant::now();

        let executions = self
            .store
            .fetch_executions(owner, self.options.mode)
            .await?;
        let fetched = executions.len();
        let buckets = group_into_buckets(executions);
        let bucket_count = buckets.len();

        // Match everything before writing anything so a bad row aborts cleanly.
        let matched_at = now_millis();
        let mut outcomes = Vec::with_capacity(bucket_count);
        for (key, members) in buckets {
            match FifoMatcher::match_bucket(key.clone(), members, matched_at) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!(bucket = %key, execution_id = %err.execution_id(), error = %err, "validation failed");
                    return Err(err.into());
                }
            }
        }
        outcomes.retain(|o| !o.updates.is_empty());

        let matches = match self.options.commit_scope {
            CommitScope::Bucket => self.commit_buckets(&outcomes).await?,
            CommitScope::Run => self.commit_run(&outcomes).await?,
        };

        info!(
            executions = fetched,
            buckets = bucket_count,
            committed_buckets = outcomes.len(),
            matches = matches.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reconciliation complete"
        );
        Ok(matches)
    }

    async fn commit_buckets(&self, outcomes: &[BucketOutcome]) -> Result<Vec<Match>, StoreError> {
        let parallelism = self.options.max_parallel_buckets.max(1);
        let keys: Vec<BucketKey> = outcomes.iter().map(|o| o.key.clone()).collect();
        let commits: Vec<BucketCommit> = outcomes.iter().map(BucketCommit::from_outcome).collect();

        let results: Vec<Result<Vec<Match>, StoreError>> =
            stream::iter(commits.into_iter().map(|commit| {
                let store = self.store.clone();
                async move { store.commit_bucket(&commit).await }
            }))
            .buffered(parallelism)
            .collect()
            .await;

        let mut matches = Vec::new();
        let mut first_error = None;
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(stored) => matches.extend(stored),
                Err(err) => {
                    warn!(bucket = %key, error = %err, "bucket commit failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(matches),
        }
    }

    async fn commit_run(&self, outcomes: &[BucketOutcome]) -> Result<Vec<Match>, StoreError> {
        let mut commit = BucketCommit::default();
        for outcome in outcomes {
            commit.extend(BucketCommit::from_outcome(outcome));
        }
        if commit.is_empty() {
            return Ok(Vec::new());
        }
        self.store.commit_bucket(&commit).await.map_err(|err| {
            warn!(error = %err, "run commit failed");
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, Decimal, NewExecution, Portfolio, Symbol};
    use crate::store::{ExecutionStore, InMemoryStore, MatchStore};
    use chrono::NaiveDate;

    fn exec(owner: &str, symbol: &str, action: Action, qty: i64, price: i64, day: u32) -> NewExecution {
        NewExecution::equity(
            OwnerId::new(owner),
            Portfolio::new("main"),
            Symbol::new(symbol),
            action,
            Decimal::from(qty),
            Decimal::from(price),
            Decimal::zero(),
            NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        )
    }

    async fn seeded(store: &InMemoryStore) {
        store
            .insert_executions(&[
                exec("a", "AAPL", Action::Buy, 10, 10, 1),
                exec("a", "AAPL", Action::Sell, 10, 12, 2),
                exec("a", "MSFT", Action::Buy, 5, 20, 1),
                exec("a", "MSFT", Action::Sell, 5, 25, 3),
            ])
            .await
            .unwrap();
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_run_futures_can_be_spawned() {
        let store = Arc::new(InMemoryStore::new());
        seeded(&store).await;
        let reconciler = Arc::new(Reconciler::new(store.clone(), ReconcileOptions::default()));

        let owner = OwnerId::new("a");
        assert_send(&reconciler.match_all());
        assert_send(&reconciler.match_owner(&owner));

        let spawned = reconciler.clone();
        let created = tokio::spawn(async move { spawned.match_all().await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(store.match_count().await, 2);
    }

    #[tokio::test]
    async fn test_run_scope_is_all_or_nothing() {
        let store = Arc::new(InMemoryStore::new());
        seeded(&store).await;
        store.fail_commits(true);

        let reconciler = Reconciler::new(
            store.clone(),
            ReconcileOptions {
                commit_scope: CommitScope::Run,
                ..ReconcileOptions::default()
            },
        );
        let err = reconciler.match_all().await.unwrap_err();
        assert!(matches!(err, ReconcileError::Persistence(_)));
        assert_eq!(store.match_count().await, 0);

        store.fail_commits(false);
        assert_eq!(reconciler.match_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_bucket_scope_failure_is_resumable() {
        let store = Arc::new(InMemoryStore::new());
        seeded(&store).await;
        store.fail_commits_after(1);

        let reconciler = Reconciler::new(
            store.clone(),
            ReconcileOptions {
                max_parallel_buckets: 1,
                ..ReconcileOptions::default()
            },
        );
        assert!(reconciler.match_all().await.is_err());
        assert_eq!(store.match_count().await, 1);

        store.fail_commits(false);
        let resumed = reconciler.match_all().await.unwrap();
        assert_eq!(resumed.len(), 1);
        assert_eq!(store.match_count().await, 2);
    }

    #[tokio::test]
    async fn test_owner_run_leaves_other_owners_alone() {
        let store = Arc::new(InMemoryStore::new());
        seeded(&store).await;
        store
            .insert_executions(&[
                exec("b", "AAPL", Action::Buy, 1, 10, 1),
                exec("b", "AAPL", Action::Sell, 1, 11, 2),
            ])
            .await
            .unwrap();

        let reconciler = Reconciler::new(store.clone(), ReconcileOptions::default());
        let created = reconciler.match_owner(&OwnerId::new("b")).await.unwrap();
        assert_eq!(created.len(), 1);
        assert!(store
            .matches_for_owner(&OwnerId::new("a"))
            .await
            .unwrap()
            .is_empty());
    }
}
