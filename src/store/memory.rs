//! In-memory ledger store for tests and embedding.

use super::{
    check_new_execution, BucketCommit, ExecutionStore, FetchMode, LedgerStore, MatchStore,
    PurgeReport, ResetReport, StoreError,
};
use crate::domain::{
    DateRange, Execution, ExecutionId, Match, MatchId, MatchKind, NewExecution, NewMatch, OwnerId,
};
use crate::engine::RemainingUpdate;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

const NEVER_FAIL: usize = usize::MAX;

#[derive(Debug, Default)]
struct State {
    executions: BTreeMap<ExecutionId, Execution>,
    import_keys: HashMap<String, ExecutionId>,
    matches: BTreeMap<MatchId, Match>,
    next_execution_id: i64,
    next_match_id: i64,
}

impl State {
    fn insert_execution(&mut self, new: NewExecution) -> Execution {
        self.next_execution_id += 1;
        let id = ExecutionId(self.next_execution_id);
        if let Some(key) = &new.import_key {
            self.import_keys.insert(key.clone(), id);
        }
        let execution = new.into_execution(id);
        self.executions.insert(id, execution.clone());
        execution
    }

    fn insert_match(&mut self, new: NewMatch) -> Match {
        self.next_match_id += 1;
        let stored = new.with_id(MatchId(self.next_match_id));
        self.matches.insert(stored.id, stored.clone());
        stored
    }

    fn check_update(&self, update: &RemainingUpdate) -> Result<(), StoreError> {
        let current = self
            .executions
            .get(&update.execution_id)
            .ok_or(StoreError::NotFound(update.execution_id))?;
        if current.version != update.expected_version {
            return Err(StoreError::Conflict(update.execution_id));
        }
        Ok(())
    }

    fn apply_update(&mut self, update: &RemainingUpdate) {
        if let Some(execution) = self.executions.get_mut(&update.execution_id) {
            execution.remaining_quantity = update.remaining_quantity;
            execution.version += 1;
        }
    }

    fn owned_by(&self, id: ExecutionId, owner: &OwnerId) -> bool {
        self.executions
            .get(&id)
            .map(|e| &e.owner == owner)
            .unwrap_or(false)
    }

    fn match_belongs_to(&self, m: &Match, owner: &OwnerId) -> bool {
        self.owned_by(m.buy_execution_id, owner) || self.owned_by(m.sell_execution_id, owner)
    }

    fn delete_matches(&mut self, owner: &OwnerId, kind: MatchKind) -> u64 {
        let doomed: Vec<MatchId> = self
            .matches
            .values()
            .filter(|m| m.kind() == kind && self.match_belongs_to(m, owner))
            .map(|m| m.id)
            .collect();
        for id in &doomed {
            self.matches.remove(id);
        }
        doomed.len() as u64
    }

    fn reset_remaining(&mut self, owner: &OwnerId) -> u64 {
        let mut count = 0;
        for execution in self.executions.values_mut().filter(|e| &e.owner == owner) {
            execution.remaining_quantity = execution.quantity;
            execution.version += 1;
            count += 1;
        }
        count
    }
}

/// Ledger store backed by process memory.
///
/// Writes can be made to fail on demand to exercise error paths.
#[derive(Debug)]
pub struct InMemoryStore {
    state: Mutex<State>,
    commits_before_failure: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            commits_before_failure: AtomicUsize::new(NEVER_FAIL),
        }
    }

    /// Make every subsequent write fail (`true`) or succeed again (`false`).
    pub fn fail_commits(&self, fail: bool) {
        let budget = if fail { 0 } else { NEVER_FAIL };
        self.commits_before_failure.store(budget, Ordering::SeqCst);
    }

    /// Allow `n` more successful writes, then fail every write after.
    pub fn fail_commits_after(&self, n: usize) {
        self.commits_before_failure.store(n, Ordering::SeqCst);
    }

    fn admit_write(&self) -> Result<(), StoreError> {
        let admitted = self
            .commits_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                NEVER_FAIL => Some(NEVER_FAIL),
                n => Some(n - 1),
            })
            .is_ok();
        if admitted {
            Ok(())
        } else {
            Err(StoreError::Unavailable("injected write failure".to_string()))
        }
    }

    pub async fn execution_count(&self) -> usize {
        self.state.lock().await.executions.len()
    }

    pub async fn match_count(&self) -> usize {
        self.state.lock().await.matches.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn insert_execution(&self, execution: NewExecution) -> Result<Execution, StoreError> {
        check_new_execution(&execution)?;
        let mut state = self.state.lock().await;
        if let Some(id) = execution
            .import_key
            .as_ref()
            .and_then(|key| state.import_keys.get(key))
        {
            let id = *id;
            return state
                .executions
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound(id));
        }
        Ok(state.insert_execution(execution))
    }

    async fn insert_executions(&self, executions: &[NewExecution]) -> Result<usize, StoreError> {
        for execution in executions {
            check_new_execution(execution)?;
        }
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for execution in executions {
            let duplicate = execution
                .import_key
                .as_ref()
                .map(|key| state.import_keys.contains_key(key))
                .unwrap_or(false);
            if !duplicate {
                state.insert_execution(execution.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>, StoreError> {
        Ok(self.state.lock().await.executions.get(&id).cloned())
    }

    async fn fetch_executions(
        &self,
        owner: Option<&OwnerId>,
        mode: FetchMode,
    ) -> Result<Vec<Execution>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .executions
            .values()
            .filter(|e| owner.map(|o| &e.owner == o).unwrap_or(true))
            .filter(|e| mode == FetchMode::All || e.is_open())
            .cloned()
            .collect())
    }

    async fn update_remaining(&self, update: &RemainingUpdate) -> Result<(), StoreError> {
        self.admit_write()?;
        let mut state = self.state.lock().await;
        state.check_update(update)?;
        state.apply_update(update);
        Ok(())
    }

    async fn reset_remaining(&self, owner: &OwnerId) -> Result<u64, StoreError> {
        self.admit_write()?;
        Ok(self.state.lock().await.reset_remaining(owner))
    }
}

#[async_trait]
impl MatchStore for InMemoryStore {
    async fn insert_matches(&self, matches: &[NewMatch]) -> Result<Vec<Match>, StoreError> {
        self.admit_write()?;
        let mut state = self.state.lock().await;
        Ok(matches
            .iter()
            .cloned()
            .map(|m| state.insert_match(m))
            .collect())
    }

    async fn delete_matches(&self, owner: &OwnerId, kind: MatchKind) -> Result<u64, StoreError> {
        self.admit_write()?;
        Ok(self.state.lock().await.delete_matches(owner, kind))
    }

    async fn matches_for_owner(&self, owner: &OwnerId) -> Result<Vec<Match>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .matches
            .values()
            .filter(|m| state.match_belongs_to(m, owner))
            .cloned()
            .collect())
    }

    async fn matches_between(&self, range: DateRange) -> Result<Vec<Match>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .matches
            .values()
            .filter(|m| range.contains(m.matched_at))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn commit_bucket(&self, commit: &BucketCommit) -> Result<Vec<Match>, StoreError> {
        self.admit_write()?;
        let mut state = self.state.lock().await;
        for update in &commit.updates {
            state.check_update(update)?;
        }
        for update in &commit.updates {
            state.apply_update(update);
        }
        Ok(commit
            .matches
            .iter()
            .cloned()
            .map(|m| state.insert_match(m))
            .collect())
    }

    async fn purge_matches(&self, owner: &OwnerId) -> Result<PurgeReport, StoreError> {
        self.admit_write()?;
        let mut state = self.state.lock().await;
        Ok(PurgeReport {
            stock: state.delete_matches(owner, MatchKind::Stock),
            option: state.delete_matches(owner, MatchKind::Option),
        })
    }

    async fn reset_owner(&self, owner: &OwnerId) -> Result<ResetReport, StoreError> {
        self.admit_write()?;
        let mut state = self.state.lock().await;
        let purged = PurgeReport {
            stock: state.delete_matches(owner, MatchKind::Stock),
            option: state.delete_matches(owner, MatchKind::Option),
        };
        let executions_reset = state.reset_remaining(owner);
        Ok(ResetReport {
            purged,
            executions_reset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, Decimal, Portfolio, Symbol};
    use chrono::NaiveDate;

    fn new_exec(owner: &str, key: Option<&str>) -> NewExecution {
        let exec = NewExecution::equity(
            OwnerId::new(owner),
            Portfolio::new("main"),
            Symbol::new("AAPL"),
            Action::Buy,
            Decimal::from(10),
            Decimal::from(5),
            Decimal::zero(),
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        match key {
            Some(k) => exec.with_import_key(k.to_string()),
            None => exec,
        }
    }

    #[tokio::test]
    async fn test_negative_quantity_rejected() {
        let store = InMemoryStore::new();
        let mut negative = new_exec("alice", None);
        negative.quantity = Decimal::from(-5);

        let err = store.insert_execution(negative.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));

        let batch = vec![new_exec("bob", Some("k1")), negative];
        assert!(store.insert_executions(&batch).await.is_err());
        assert_eq!(store.execution_count().await, 0);
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let store = InMemoryStore::new();
        let a = store.insert_execution(new_exec("a", None)).await.unwrap();
        let b = store.insert_execution(new_exec("a", None)).await.unwrap();
        assert_eq!(a.id, ExecutionId(1));
        assert_eq!(b.id, ExecutionId(2));
    }

    #[tokio::test]
    async fn test_batch_insert_skips_known_import_keys() {
        let store = InMemoryStore::new();
        let batch = vec![new_exec("a", Some("k1")), new_exec("a", Some("k2"))];
        assert_eq!(store.insert_executions(&batch).await.unwrap(), 2);
        assert_eq!(store.insert_executions(&batch).await.unwrap(), 0);
        assert_eq!(store.execution_count().await, 2);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryStore::new();
        let exec = store.insert_execution(new_exec("a", None)).await.unwrap();
        let update = RemainingUpdate {
            execution_id: exec.id,
            expected_version: 0,
            remaining_quantity: Decimal::from(4),
        };
        store.update_remaining(&update).await.unwrap();
        let err = store.update_remaining(&update).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == exec.id));

        let stored = store.get_execution(exec.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.remaining_quantity, Decimal::from(4));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_state_untouched() {
        let store = InMemoryStore::new();
        let exec = store.insert_execution(new_exec("a", None)).await.unwrap();
        store.fail_commits(true);
        let commit = BucketCommit {
            updates: vec![RemainingUpdate {
                execution_id: exec.id,
                expected_version: 0,
                remaining_quantity: Decimal::zero(),
            }],
            matches: Vec::new(),
        };
        assert!(matches!(
            store.commit_bucket(&commit).await,
            Err(StoreError::Unavailable(_))
        ));
        let stored = store.get_execution(exec.id).await.unwrap().unwrap();
        assert_eq!(stored.remaining_quantity, Decimal::from(10));

        store.fail_commits(false);
        store.commit_bucket(&commit).await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_after_budget() {
        let store = InMemoryStore::new();
        store.fail_commits_after(1);
        let empty = BucketCommit::default();
        assert!(store.commit_bucket(&empty).await.is_ok());
        assert!(store.commit_bucket(&empty).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_owner_restores_only_that_owner() {
        let store = InMemoryStore::new();
        let a = store.insert_execution(new_exec("a", None)).await.unwrap();
        let b = store.insert_execution(new_exec("b", None)).await.unwrap();
        for id in [a.id, b.id] {
            store
                .update_remaining(&RemainingUpdate {
                    execution_id: id,
                    expected_version: 0,
                    remaining_quantity: Decimal::zero(),
                })
                .await
                .unwrap();
        }

        let report = store.reset_owner(&OwnerId::new("a")).await.unwrap();
        assert_eq!(report.executions_reset, 1);
        assert_eq!(report.purged.total(), 0);

        let a = store.get_execution(a.id).await.unwrap().unwrap();
        let b = store.get_execution(b.id).await.unwrap().unwrap();
        assert_eq!(a.remaining_quantity, Decimal::from(10));
        assert_eq!(a.version, 2);
        assert_eq!(b.remaining_quantity, Decimal::zero());
    }
}
