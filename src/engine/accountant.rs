//! Proceeds, cost basis and prorated commission for a single match.

use crate::domain::{Decimal, Execution};
use crate::error::ValidationError;

/// Pricing inputs of one side of a match, validated present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotSide {
    pub price: Decimal,
    pub commission: Decimal,
    /// Original execution quantity, the proration denominator.
    pub quantity: Decimal,
}

impl LotSide {
    /// Extract pricing inputs; absent price or commission is a validation failure.
    pub fn from_execution(execution: &Execution) -> Result<Self, ValidationError> {
        let price = execution.price.ok_or(ValidationError::MissingField {
            execution_id: execution.id,
            field: "price",
        })?;
        let commission = execution.commission.ok_or(ValidationError::MissingField {
            execution_id: execution.id,
            field: "commission",
        })?;
        Ok(LotSide {
            price,
            commission,
            quantity: execution.quantity,
        })
    }
}

/// Commission share for `matched` out of `original`, rounded half-up to the cent.
///
/// Zero original quantity yields a zero portion.
pub fn commission_portion(commission: Decimal, matched: Decimal, original: Decimal) -> Decimal {
    if original.is_zero() {
        return Decimal::zero();
    }
    (commission * matched / original).round_cents()
}

/// Money figures of one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotAccounting {
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub buy_commission: Decimal,
    pub sell_commission: Decimal,
}

impl LotAccounting {
    /// `buy_side` is the Buy/Cover execution, `sell_side` the Sell/Short execution.
    pub fn compute(buy_side: &LotSide, sell_side: &LotSide, matched: Decimal) -> Self {
        let buy_commission = commission_portion(buy_side.commission, matched, buy_side.quantity);
        let sell_commission =
            commission_portion(sell_side.commission, matched, sell_side.quantity);

        let proceeds = sell_side.price * matched - sell_commission;
        let cost_basis = buy_side.price * matched - buy_commission;

        LotAccounting {
            proceeds,
            cost_basis,
            buy_commission,
            sell_commission,
        }
    }

    pub fn gain_loss(&self) -> Decimal {
        self.proceeds - self.cost_basis
    }
}
