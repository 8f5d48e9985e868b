//! Realized match records produced by reconciliation.

use crate::domain::{Decimal, ExecutionId, MatchId, MatchKind};
use super::holding::{days_held, HoldingTerm};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variant-specific match data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match_type", rename_all = "lowercase")]
pub enum MatchDetails {
    Stock,
    Option {
        #[serde(skip_serializing_if = "Option::is_none")]
        contract_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        premium: Option<Decimal>,
    },
}

impl MatchDetails {
    pub fn kind(&self) -> MatchKind {
        match self {
            MatchDetails::Stock => MatchKind::Stock,
            MatchDetails::Option { .. } => MatchKind::Option,
        }
    }
}

/// A match awaiting a store-assigned identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMatch {
    /// Buy or Cover execution.
    pub buy_execution_id: ExecutionId,
    /// Sell or Short execution.
    pub sell_execution_id: ExecutionId,
    pub matched_quantity: Decimal,
    /// Price of the position-closing execution.
    pub matched_price: Decimal,
    /// Time of reconciliation.
    pub matched_at: DateTime<Utc>,
    pub acquired_at: NaiveDateTime,
    pub disposed_at: NaiveDateTime,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub short_term_gain_loss: Decimal,
    pub long_term_gain_loss: Decimal,
    #[serde(flatten)]
    pub details: MatchDetails,
}

impl NewMatch {
    pub fn with_id(self, id: MatchId) -> Match {
        Match {
            id,
            buy_execution_id: self.buy_execution_id,
            sell_execution_id: self.sell_execution_id,
            matched_quantity: self.matched_quantity,
            matched_price: self.matched_price,
            matched_at: self.matched_at,
            acquired_at: self.acquired_at,
            disposed_at: self.disposed_at,
            proceeds: self.proceeds,
            cost_basis: self.cost_basis,
            short_term_gain_loss: self.short_term_gain_loss,
            long_term_gain_loss: self.long_term_gain_loss,
            details: self.details,
        }
    }

    pub fn kind(&self) -> MatchKind {
        self.details.kind()
    }
}

/// A persisted realized match. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub buy_execution_id: ExecutionId,
    pub sell_execution_id: ExecutionId,
    pub matched_quantity: Decimal,
    pub matched_price: Decimal,
    pub matched_at: DateTime<Utc>,
    pub acquired_at: NaiveDateTime,
    pub disposed_at: NaiveDateTime,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub short_term_gain_loss: Decimal,
    pub long_term_gain_loss: Decimal,
    #[serde(flatten)]
    pub details: MatchDetails,
}

/// Match content without identity or reconciliation timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchContent {
    pub buy_execution_id: ExecutionId,
    pub sell_execution_id: ExecutionId,
    pub matched_quantity: Decimal,
    pub matched_price: Decimal,
    pub acquired_at: NaiveDateTime,
    pub disposed_at: NaiveDateTime,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub short_term_gain_loss: Decimal,
    pub long_term_gain_loss: Decimal,
    pub details: MatchDetails,
}

impl Match {
    pub fn kind(&self) -> MatchKind {
        self.details.kind()
    }

    pub fn gain_loss(&self) -> Decimal {
        self.proceeds - self.cost_basis
    }

    pub fn days_held(&self) -> i64 {
        days_held(self.acquired_at, self.disposed_at)
    }

    pub fn holding_term(&self) -> HoldingTerm {
        HoldingTerm::from_days(self.days_held())
    }

    pub fn references(&self, execution_id: ExecutionId) -> bool {
        self.buy_execution_id == execution_id || self.sell_execution_id == execution_id
    }

    pub fn content(&self) -> MatchContent {
        MatchContent {
            buy_execution_id: self.buy_execution_id,
            sell_execution_id: self.sell_execution_id,
            matched_quantity: self.matched_quantity,
            matched_price: self.matched_price,
            acquired_at: self.acquired_at,
            disposed_at: self.disposed_at,
            proceeds: self.proceeds,
            cost_basis: self.cost_basis,
            short_term_gain_loss: self.short_term_gain_loss,
            long_term_gain_loss: self.long_term_gain_loss,
            details: self.details.clone(),
        }
    }
}
