//! Execution operations for the repository.

use crate::domain::{Execution, ExecutionId, NewExecution, OwnerId};
use crate::engine::RemainingUpdate;
use crate::store::{check_new_execution, ExecutionStore, FetchMode, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnection;

use super::{
    apply_remaining_update, execution_from_row, naive_to_ms, reset_owner_remaining, Repository,
    EXECUTION_COLUMNS,
};

/// Insert one execution unless its import key is already present.
///
/// Returns the new row id, or `None` for a duplicate.
async fn insert_execution_row(
    conn: &mut SqliteConnection,
    e: &NewExecution,
    created_at: i64,
) -> Result<Option<ExecutionId>, StoreError> {
    let option = e.option.as_ref();
    let result = sqlx::query(
        r#"
        INSERT INTO executions (
            owner, portfolio, symbol, instrument, action, quantity, price, commission,
            executed_at_ms, remaining_quantity, open_lot, version,
            option_contract, option_underlying, option_type, option_expiration,
            option_strike, option_shares_per_contract, option_premium,
            import_key, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(import_key) DO NOTHING
        "#,
    )
    .bind(e.owner.as_str())
    .bind(e.portfolio.as_str())
    .bind(e.symbol.as_str())
    .bind(e.instrument.as_str())
    .bind(e.action.as_str())
    .bind(e.quantity.to_canonical_string())
    .bind(e.price.map(|d| d.to_canonical_string()))
    .bind(e.commission.map(|d| d.to_canonical_string()))
    .bind(naive_to_ms(e.executed_at))
    .bind(e.quantity.to_canonical_string())
    .bind(e.quantity.is_positive())
    .bind(option.map(|o| o.contract_id.clone()))
    .bind(option.map(|o| o.underlying.clone()))
    .bind(option.map(|o| o.option_type.as_str()))
    .bind(option.map(|o| o.expiration.format("%Y-%m-%d").to_string()))
    .bind(option.map(|o| o.strike.to_canonical_string()))
    .bind(option.map(|o| o.shares_per_contract.to_canonical_string()))
    .bind(option.and_then(|o| o.premium).map(|d| d.to_canonical_string()))
    .bind(e.import_key.as_deref())
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(ExecutionId(result.last_insert_rowid())))
}

impl Repository {
    async fn execution_by_import_key(&self, key: &str) -> Result<Option<Execution>, StoreError> {
        let sql = format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE import_key = ?");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(execution_from_row).transpose()
    }
}

#[async_trait]
impl ExecutionStore for Repository {
    async fn insert_execution(&self, execution: NewExecution) -> Result<Execution, StoreError> {
        check_new_execution(&execution)?;
        let mut conn = self.pool.acquire().await?;
        let created_at = chrono::Utc::now().timestamp_millis();

        match insert_execution_row(&mut conn, &execution, created_at).await? {
            Some(id) => Ok(execution.into_execution(id)),
            None => {
                // Only a conflicting import key suppresses the insert.
                let key = execution.import_key.as_deref().unwrap_or_default();
                self.execution_by_import_key(key)
                    .await?
                    .ok_or_else(|| StoreError::Corrupt(format!("import_key={key}")))
            }
        }
    }

    async fn insert_executions(&self, executions: &[NewExecution]) -> Result<usize, StoreError> {
        if executions.is_empty() {
            return Ok(0);
        }
        for execution in executions {
            check_new_execution(execution)?;
        }

        let created_at = chrono::Utc::now().timestamp_millis();
        let mut total_inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for execution in executions {
            if insert_execution_row(&mut tx, execution, created_at)
                .await?
                .is_some()
            {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>, StoreError> {
        let sql = format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(execution_from_row).transpose()
    }

    async fn fetch_executions(
        &self,
        owner: Option<&OwnerId>,
        mode: FetchMode,
    ) -> Result<Vec<Execution>, StoreError> {
        let mut conditions = Vec::new();
        if owner.is_some() {
            conditions.push("owner = ?");
        }
        if mode == FetchMode::Unmatched {
            conditions.push("open_lot = 1");
        }
        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions {filter} ORDER BY executed_at_ms ASC, id ASC"
        );

        let mut query = sqlx::query(&sql);
        if let Some(owner) = owner {
            query = query.bind(owner.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(execution_from_row).collect()
    }

    async fn update_remaining(&self, update: &RemainingUpdate) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        apply_remaining_update(&mut conn, update).await
    }

    async fn reset_remaining(&self, owner: &OwnerId) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        reset_owner_remaining(&mut conn, owner).await
    }
}
