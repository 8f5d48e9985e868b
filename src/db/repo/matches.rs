//! Match operations for the repository.

use crate::domain::{DateRange, Match, MatchKind, NewMatch, OwnerId};
use crate::store::{MatchStore, StoreError};
use async_trait::async_trait;

use super::{delete_owner_matches, insert_match_row, match_from_row, Repository, MATCH_COLUMNS};

#[async_trait]
impl MatchStore for Repository {
    async fn insert_matches(&self, matches: &[NewMatch]) -> Result<Vec<Match>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(matches.len());
        for new_match in matches {
            let id = insert_match_row(&mut tx, new_match).await?;
            stored.push(new_match.clone().with_id(id));
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn delete_matches(&self, owner: &OwnerId, kind: MatchKind) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        delete_owner_matches(&mut conn, owner, kind).await
    }

    async fn matches_for_owner(&self, owner: &OwnerId) -> Result<Vec<Match>, StoreError> {
        let sql = format!(
            r#"
            SELECT {MATCH_COLUMNS} FROM matches
            WHERE buy_execution_id IN (SELECT id FROM executions WHERE owner = ?)
               OR sell_execution_id IN (SELECT id FROM executions WHERE owner = ?)
            ORDER BY id ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(owner.as_str())
            .bind(owner.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn matches_between(&self, range: DateRange) -> Result<Vec<Match>, StoreError> {
        let sql = format!(
            r#"
            SELECT {MATCH_COLUMNS} FROM matches
            WHERE matched_at_ms >= ? AND matched_at_ms <= ?
            ORDER BY matched_at_ms ASC, id ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(match_from_row).collect()
    }
}
