//! Split of realized gains into short-term and long-term fields.

use crate::domain::{Decimal, HoldingTerm};

/// Gain/loss split into its short-term and long-term fields.
///
/// Exactly one field carries the gain; the other is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainSplit {
    pub term: HoldingTerm,
    pub short_term: Decimal,
    pub long_term: Decimal,
}

impl GainSplit {
    pub fn classify(gain_loss: Decimal, days_held: i64) -> Self {
        let term = HoldingTerm::from_days(days_held);
        match term {
            HoldingTerm::ShortTerm => GainSplit {
                term,
                short_term: gain_loss,
                long_term: Decimal::zero(),
            },
            HoldingTerm::LongTerm => GainSplit {
                term,
                short_term: Decimal::zero(),
                long_term: gain_loss,
            },
        }
    }
}
