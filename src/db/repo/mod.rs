//! SQLite-backed ledger store.
//!
//! This module provides the `Repository` struct implementing the store traits.
//! Methods are organized across submodules by table:
//! - `executions.rs` - Execution ingestion, fetch and remaining-quantity updates
//! - `matches.rs` - Match persistence, deletion and queries
//!
//! Transactional operations spanning both tables live here.

mod executions;
mod matches;

use crate::domain::{
    Action, Decimal, Execution, ExecutionId, InstrumentKind, Match, MatchDetails, MatchId,
    MatchKind, NewMatch, OptionDetails, OptionType, OwnerId, Portfolio, Symbol,
};
use crate::engine::RemainingUpdate;
use crate::store::{BucketCommit, LedgerStore, PurgeReport, ResetReport, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, warn};

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }
}

#[async_trait]
impl LedgerStore for Repository {
    async fn commit_bucket(&self, commit: &BucketCommit) -> Result<Vec<Match>, StoreError> {
        let mut tx = self.pool.begin().await?;

        for update in &commit.updates {
            apply_remaining_update(&mut tx, update).await?;
        }

        let mut stored = Vec::with_capacity(commit.matches.len());
        for new_match in &commit.matches {
            let id = insert_match_row(&mut tx, new_match).await?;
            stored.push(new_match.clone().with_id(id));
        }

        tx.commit().await?;
        debug!(
            updates = commit.updates.len(),
            matches = stored.len(),
            "bucket committed"
        );
        Ok(stored)
    }

    async fn purge_matches(&self, owner: &OwnerId) -> Result<PurgeReport, StoreError> {
        let mut tx = self.pool.begin().await?;
        let report = PurgeReport {
            stock: delete_owner_matches(&mut tx, owner, MatchKind::Stock).await?,
            option: delete_owner_matches(&mut tx, owner, MatchKind::Option).await?,
        };
        tx.commit().await?;
        Ok(report)
    }

    async fn reset_owner(&self, owner: &OwnerId) -> Result<ResetReport, StoreError> {
        let mut tx = self.pool.begin().await?;
        let purged = PurgeReport {
            stock: delete_owner_matches(&mut tx, owner, MatchKind::Stock).await?,
            option: delete_owner_matches(&mut tx, owner, MatchKind::Option).await?,
        };
        let executions_reset = reset_owner_remaining(&mut tx, owner).await?;
        tx.commit().await?;
        Ok(ResetReport {
            purged,
            executions_reset,
        })
    }
}

// =========================================================================
// Statements shared between single operations and transactions
// =========================================================================

async fn apply_remaining_update(
    conn: &mut SqliteConnection,
    update: &RemainingUpdate,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE executions
        SET remaining_quantity = ?, open_lot = ?, version = version + 1
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(update.remaining_quantity.to_canonical_string())
    .bind(update.remaining_quantity.is_positive())
    .bind(update.execution_id.as_i64())
    .bind(update.expected_version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM executions WHERE id = ?")
            .bind(update.execution_id.as_i64())
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match exists {
            Some(_) => StoreError::Conflict(update.execution_id),
            None => StoreError::NotFound(update.execution_id),
        });
    }
    Ok(())
}

async fn reset_owner_remaining(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE executions
        SET remaining_quantity = quantity,
            open_lot = CASE WHEN CAST(quantity AS REAL) > 0 THEN 1 ELSE 0 END,
            version = version + 1
        WHERE owner = ?
        "#,
    )
    .bind(owner.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_match_row(
    conn: &mut SqliteConnection,
    m: &NewMatch,
) -> Result<MatchId, StoreError> {
    let (contract_id, premium) = match &m.details {
        MatchDetails::Stock => (None, None),
        MatchDetails::Option {
            contract_id,
            premium,
        } => (
            contract_id.clone(),
            premium.map(|p| p.to_canonical_string()),
        ),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO matches (
            match_type, buy_execution_id, sell_execution_id, matched_quantity,
            matched_price, matched_at_ms, acquired_at_ms, disposed_at_ms,
            proceeds, cost_basis, short_term_gain_loss, long_term_gain_loss,
            contract_id, premium
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(m.kind().as_str())
    .bind(m.buy_execution_id.as_i64())
    .bind(m.sell_execution_id.as_i64())
    .bind(m.matched_quantity.to_canonical_string())
    .bind(m.matched_price.to_canonical_string())
    .bind(m.matched_at.timestamp_millis())
    .bind(naive_to_ms(m.acquired_at))
    .bind(naive_to_ms(m.disposed_at))
    .bind(m.proceeds.to_canonical_string())
    .bind(m.cost_basis.to_canonical_string())
    .bind(m.short_term_gain_loss.to_canonical_string())
    .bind(m.long_term_gain_loss.to_canonical_string())
    .bind(contract_id)
    .bind(premium)
    .execute(&mut *conn)
    .await?;

    Ok(MatchId(result.last_insert_rowid()))
}

async fn delete_owner_matches(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    kind: MatchKind,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        DELETE FROM matches
        WHERE match_type = ?
          AND (buy_execution_id IN (SELECT id FROM executions WHERE owner = ?)
               OR sell_execution_id IN (SELECT id FROM executions WHERE owner = ?))
        "#,
    )
    .bind(kind.as_str())
    .bind(owner.as_str())
    .bind(owner.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

// =========================================================================
// Row mapping
// =========================================================================

const EXECUTION_COLUMNS: &str = r#"
    id, owner, portfolio, symbol, instrument, action, quantity, price, commission,
    executed_at_ms, remaining_quantity, version, option_contract, option_underlying,
    option_type, option_expiration, option_strike, option_shares_per_contract, option_premium
"#;

const MATCH_COLUMNS: &str = r#"
    id, match_type, buy_execution_id, sell_execution_id, matched_quantity, matched_price,
    matched_at_ms, acquired_at_ms, disposed_at_ms, proceeds, cost_basis,
    short_term_gain_loss, long_term_gain_loss, contract_id, premium
"#;

fn naive_to_ms(at: NaiveDateTime) -> i64 {
    at.and_utc().timestamp_millis()
}

fn corrupt(column: &str, raw: &str) -> StoreError {
    warn!(column = column, raw = raw, "unparseable stored value");
    StoreError::Corrupt(format!("{column}={raw}"))
}

fn decimal_col(row: &SqliteRow, column: &str) -> Result<Decimal, StoreError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|_| corrupt(column, &raw))
}

fn opt_decimal_col(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, StoreError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|_| corrupt(column, &s)))
        .transpose()
}

fn naive_col(row: &SqliteRow, column: &str) -> Result<NaiveDateTime, StoreError> {
    let ms: i64 = row.try_get(column)?;
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| corrupt(column, &ms.to_string()))
}

fn utc_col(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let ms: i64 = row.try_get(column)?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| corrupt(column, &ms.to_string()))
}

fn option_details(row: &SqliteRow) -> Result<Option<OptionDetails>, StoreError> {
    let contract: Option<String> = row.try_get("option_contract")?;
    let Some(contract_id) = contract else {
        return Ok(None);
    };

    let underlying: Option<String> = row.try_get("option_underlying")?;
    let type_raw: Option<String> = row.try_get("option_type")?;
    let type_raw = type_raw.unwrap_or_default();
    let option_type = OptionType::parse(&type_raw).ok_or_else(|| corrupt("option_type", &type_raw))?;
    let expiration_raw: Option<String> = row.try_get("option_expiration")?;
    let expiration_raw = expiration_raw.unwrap_or_default();
    let expiration = NaiveDate::parse_from_str(&expiration_raw, "%Y-%m-%d")
        .map_err(|_| corrupt("option_expiration", &expiration_raw))?;

    Ok(Some(OptionDetails {
        contract_id,
        underlying: underlying.unwrap_or_default(),
        option_type,
        expiration,
        strike: opt_decimal_col(row, "option_strike")?.unwrap_or_default(),
        shares_per_contract: opt_decimal_col(row, "option_shares_per_contract")?
            .unwrap_or_default(),
        premium: opt_decimal_col(row, "option_premium")?,
    }))
}

fn execution_from_row(row: &SqliteRow) -> Result<Execution, StoreError> {
    let instrument_raw: String = row.try_get("instrument")?;
    let instrument = InstrumentKind::parse(&instrument_raw)
        .ok_or_else(|| corrupt("instrument", &instrument_raw))?;
    let action_raw: String = row.try_get("action")?;
    let action = Action::from_str(&action_raw).map_err(|_| corrupt("action", &action_raw))?;

    Ok(Execution {
        id: ExecutionId(row.try_get("id")?),
        owner: OwnerId::new(row.try_get::<String, _>("owner")?),
        portfolio: Portfolio::new(row.try_get::<String, _>("portfolio")?),
        symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
        instrument,
        action,
        quantity: decimal_col(row, "quantity")?,
        price: opt_decimal_col(row, "price")?,
        commission: opt_decimal_col(row, "commission")?,
        executed_at: naive_col(row, "executed_at_ms")?,
        remaining_quantity: decimal_col(row, "remaining_quantity")?,
        version: row.try_get("version")?,
        option: option_details(row)?,
    })
}

fn match_from_row(row: &SqliteRow) -> Result<Match, StoreError> {
    let kind_raw: String = row.try_get("match_type")?;
    let details = match MatchKind::parse(&kind_raw) {
        Some(MatchKind::Stock) => MatchDetails::Stock,
        Some(MatchKind::Option) => MatchDetails::Option {
            contract_id: row.try_get("contract_id")?,
            premium: opt_decimal_col(row, "premium")?,
        },
        None => return Err(corrupt("match_type", &kind_raw)),
    };

    Ok(Match {
        id: MatchId(row.try_get("id")?),
        buy_execution_id: ExecutionId(row.try_get("buy_execution_id")?),
        sell_execution_id: ExecutionId(row.try_get("sell_execution_id")?),
        matched_quantity: decimal_col(row, "matched_quantity")?,
        matched_price: decimal_col(row, "matched_price")?,
        matched_at: utc_col(row, "matched_at_ms")?,
        acquired_at: naive_col(row, "acquired_at_ms")?,
        disposed_at: naive_col(row, "disposed_at_ms")?,
        proceeds: decimal_col(row, "proceeds")?,
        cost_basis: decimal_col(row, "cost_basis")?,
        short_term_gain_loss: decimal_col(row, "short_term_gain_loss")?,
        long_term_gain_loss: decimal_col(row, "long_term_gain_loss")?,
        details,
    })
}
