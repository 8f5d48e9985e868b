use serde::Serialize;

use crate::domain::{Decimal, Match, MatchKind};

/// Aggregate realized figures over a set of matches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RealizedSummary {
    pub matches: usize,
    pub stock_matches: usize,
    pub option_matches: usize,
    pub quantity: Decimal,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub short_term_gain_loss: Decimal,
    pub long_term_gain_loss: Decimal,
    pub net_gain_loss: Decimal,
}

impl RealizedSummary {
    pub fn from_matches(matches: &[Match]) -> Self {
        let mut summary = RealizedSummary::default();
        for m in matches {
            summary.matches += 1;
            match m.kind() {
                MatchKind::Stock => summary.stock_matches += 1,
                MatchKind::Option => summary.option_matches += 1,
            }
            summary.quantity += m.matched_quantity;
            summary.proceeds += m.proceeds;
            summary.cost_basis += m.cost_basis;
            summary.short_term_gain_loss += m.short_term_gain_loss;
            summary.long_term_gain_loss += m.long_term_gain_loss;
        }
        summary.net_gain_loss = summary.short_term_gain_loss + summary.long_term_gain_loss;
        summary
    }
}
