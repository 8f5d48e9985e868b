//! Execution type representing a single recorded order fill.

use crate::domain::{Action, Decimal, ExecutionId, InstrumentKind, OwnerId, Portfolio, Symbol};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "call" => Some(OptionType::Call),
            "put" => Some(OptionType::Put),
            _ => None,
        }
    }
}

/// Descriptive option contract fields. Carried through matching untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDetails {
    /// OCC contract symbol.
    pub contract_id: String,
    /// Underlying root symbol.
    pub underlying: String,
    pub option_type: OptionType,
    pub expiration: NaiveDate,
    pub strike: Decimal,
    pub shares_per_contract: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium: Option<Decimal>,
}

/// Reconciliation state of an execution, derived from its remaining quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotState {
    /// remaining == quantity
    Unmatched,
    /// 0 < remaining < quantity
    PartiallyMatched,
    /// remaining == 0
    FullyMatched,
}

/// Execution as handed to a store by an ingestion path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExecution {
    pub owner: OwnerId,
    pub portfolio: Portfolio,
    pub symbol: Symbol,
    pub instrument: InstrumentKind,
    pub action: Action,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub executed_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<OptionDetails>,
    /// Deduplication key; inserts with a key already present are skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_key: Option<String>,
}

impl NewExecution {
    /// Create an equity execution with price and commission present.
    #[allow(clippy::too_many_arguments)]
    pub fn equity(
        owner: OwnerId,
        portfolio: Portfolio,
        symbol: Symbol,
        action: Action,
        quantity: Decimal,
        price: Decimal,
        commission: Decimal,
        executed_at: NaiveDateTime,
    ) -> Self {
        Self {
            owner,
            portfolio,
            symbol,
            instrument: InstrumentKind::Equity,
            action,
            quantity,
            price: Some(price),
            commission: Some(commission),
            executed_at,
            option: None,
            import_key: None,
        }
    }

    /// Mark this execution as an option trade carrying the given contract details.
    pub fn with_option(mut self, details: OptionDetails) -> Self {
        self.instrument = InstrumentKind::Option;
        self.option = Some(details);
        self
    }

    pub fn with_import_key(mut self, key: String) -> Self {
        self.import_key = Some(key);
        self
    }

    /// Materialise with a store-assigned identity: remaining starts at quantity.
    pub fn into_execution(self, id: ExecutionId) -> Execution {
        Execution {
            id,
            owner: self.owner,
            portfolio: self.portfolio,
            symbol: self.symbol,
            instrument: self.instrument,
            action: self.action,
            quantity: self.quantity,
            price: self.price,
            commission: self.commission,
            executed_at: self.executed_at,
            remaining_quantity: self.quantity,
            version: 0,
            option: self.option,
        }
    }
}

/// A persisted execution.
///
/// Only `remaining_quantity` (and its `version`) ever change after creation,
/// and only through the reconciler or an explicit reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub owner: OwnerId,
    pub portfolio: Portfolio,
    pub symbol: Symbol,
    pub instrument: InstrumentKind,
    pub action: Action,
    /// Original quantity, immutable.
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub executed_at: NaiveDateTime,
    /// Portion of `quantity` not yet reconciled.
    pub remaining_quantity: Decimal,
    /// Optimistic concurrency version, bumped on every persisted remaining change.
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<OptionDetails>,
}

impl Execution {
    pub fn lot_state(&self) -> LotState {
        if self.remaining_quantity.is_zero() {
            LotState::FullyMatched
        } else if self.remaining_quantity == self.quantity {
            LotState::Unmatched
        } else {
            LotState::PartiallyMatched
        }
    }

    pub fn is_open(&self) -> bool {
        self.remaining_quantity.is_positive()
    }

    /// Quantity already reconciled against offsetting executions.
    pub fn matched_quantity(&self) -> Decimal {
        self.quantity - self.remaining_quantity
    }

    /// Reduce the remaining quantity, flooring at zero.
    pub fn consume(&mut self, qty: Decimal) {
        self.remaining_quantity = (self.remaining_quantity - qty).max(Decimal::zero());
    }
}
