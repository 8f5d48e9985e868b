use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::domain::{
    days_held, sort_executions_fifo, Action, Decimal, Execution, InstrumentKind, MatchDetails,
    NewMatch,
};
use crate::error::ValidationError;

use super::accountant::{LotAccounting, LotSide};
use super::classifier::GainSplit;
use super::grouping::BucketKey;
use super::{BucketOutcome, RemainingUpdate};

/// FIFO queue matcher for a single bucket.
///
/// Opening executions are consumed oldest first by closing executions, also oldest first.
/// Buys pair with Sells and Shorts pair with Covers; the two passes never interact.
pub struct FifoMatcher {
    executions: Vec<Execution>,
    instrument: InstrumentKind,
    matched_at: DateTime<Utc>,
    matches: Vec<NewMatch>,
}

impl FifoMatcher {
    /// Match one bucket. Nothing is mutated if any open execution fails validation.
    pub fn match_bucket(
        key: BucketKey,
        mut executions: Vec<Execution>,
        matched_at: DateTime<Utc>,
    ) -> Result<BucketOutcome, ValidationError> {
        for execution in &executions {
            validate(execution)?;
        }
        sort_executions_fifo(&mut executions);
        let before: Vec<Decimal> = executions.iter().map(|e| e.remaining_quantity).collect();

        let mut matcher = FifoMatcher {
            executions,
            instrument: key.instrument,
            matched_at,
            matches: Vec::new(),
        };

        let mut buys = matcher.queue(Action::Buy);
        let mut sells = matcher.queue(Action::Sell);
        let mut shorts = matcher.queue(Action::Short);
        let mut covers = matcher.queue(Action::Cover);

        matcher.run_pass(&mut buys, &mut sells)?;
        matcher.run_pass(&mut shorts, &mut covers)?;

        let updates = matcher
            .executions
            .iter()
            .zip(before)
            .filter(|(execution, prior)| execution.remaining_quantity != *prior)
            .map(|(execution, _)| RemainingUpdate {
                execution_id: execution.id,
                expected_version: execution.version,
                remaining_quantity: execution.remaining_quantity,
            })
            .collect();

        Ok(BucketOutcome {
            key,
            matches: matcher.matches,
            updates,
            executions: matcher.executions,
        })
    }

    /// Indices of open executions with `action`, already in FIFO order.
    fn queue(&self, action: Action) -> VecDeque<usize> {
        self.executions
            .iter()
            .enumerate()
            .filter(|(_, e)| e.action == action && e.is_open())
            .map(|(idx, _)| idx)
            .collect()
    }

    fn run_pass(
        &mut self,
        openings: &mut VecDeque<usize>,
        closings: &mut VecDeque<usize>,
    ) -> Result<(), ValidationError> {
        while let (Some(&open_idx), Some(&close_idx)) = (openings.front(), closings.front()) {
            let qty = self.executions[open_idx]
                .remaining_quantity
                .min(self.executions[close_idx].remaining_quantity);

            let new_match = self.build_match(open_idx, close_idx, qty)?;
            self.matches.push(new_match);

            self.executions[open_idx].consume(qty);
            self.executions[close_idx].consume(qty);

            if !self.executions[open_idx].is_open() {
                openings.pop_front();
            }
            if !self.executions[close_idx].is_open() {
                closings.pop_front();
            }
        }
        Ok(())
    }

    fn build_match(
        &self,
        open_idx: usize,
        close_idx: usize,
        qty: Decimal,
    ) -> Result<NewMatch, ValidationError> {
        let opening = &self.executions[open_idx];
        let closing = &self.executions[close_idx];

        // Short lots: the Short is the sale, the Cover is the purchase.
        let (buy, sell) = if opening.action.is_buy_side() {
            (opening, closing)
        } else {
            (closing, opening)
        };

        let buy_side = LotSide::from_execution(buy)?;
        let sell_side = LotSide::from_execution(sell)?;
        let closing_side = LotSide::from_execution(closing)?;

        let accounting = LotAccounting::compute(&buy_side, &sell_side, qty);
        let split = GainSplit::classify(
            accounting.gain_loss(),
            days_held(opening.executed_at, closing.executed_at),
        );

        Ok(NewMatch {
            buy_execution_id: buy.id,
            sell_execution_id: sell.id,
            matched_quantity: qty,
            matched_price: closing_side.price,
            matched_at: self.matched_at,
            acquired_at: opening.executed_at,
            disposed_at: closing.executed_at,
            proceeds: accounting.proceeds,
            cost_basis: accounting.cost_basis,
            short_term_gain_loss: split.short_term,
            long_term_gain_loss: split.long_term,
            details: self.details(buy, sell),
        })
    }

    fn details(&self, buy: &Execution, sell: &Execution) -> MatchDetails {
        match self.instrument {
            InstrumentKind::Equity => MatchDetails::Stock,
            InstrumentKind::Option => {
                let contract_id = buy
                    .option
                    .as_ref()
                    .or(sell.option.as_ref())
                    .map(|o| o.contract_id.clone())
                    .or_else(|| Some(buy.symbol.to_string()));
                let premium = buy
                    .option
                    .as_ref()
                    .and_then(|o| o.premium)
                    .or_else(|| sell.option.as_ref().and_then(|o| o.premium));
                MatchDetails::Option {
                    contract_id,
                    premium,
                }
            }
        }
    }
}

fn validate(execution: &Execution) -> Result<(), ValidationError> {
    if execution.quantity.is_negative() {
        return Err(ValidationError::MalformedQuantity {
            execution_id: execution.id,
            detail: format!("quantity {} is negative", execution.quantity),
        });
    }
    if execution.remaining_quantity.is_negative()
        || execution.remaining_quantity > execution.quantity
    {
        return Err(ValidationError::MalformedQuantity {
            execution_id: execution.id,
            detail: format!(
                "remaining {} outside 0..={}",
                execution.remaining_quantity, execution.quantity
            ),
        });
    }
    if execution.is_open() {
        LotSide::from_execution(execution)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ExecutionId, NewExecution, OptionDetails, OptionType, OwnerId, Portfolio, Symbol,
    };
    use chrono::{NaiveDate, NaiveDateTime};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn day(y: i32, m: u32, dd: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, dd)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn exec(id: i64, action: Action, qty: &str, price: &str, at: NaiveDateTime) -> Execution {
        NewExecution::equity(
            OwnerId::new("alice"),
            Portfolio::new("main"),
            Symbol::new("AAPL"),
            action,
            d(qty),
            d(price),
            d("1"),
            at,
        )
        .into_execution(ExecutionId(id))
    }

    fn key(instrument: InstrumentKind) -> BucketKey {
        BucketKey {
            owner: OwnerId::new("alice"),
            portfolio: Portfolio::new("main"),
            symbol: Symbol::new("AAPL"),
            instrument,
        }
    }

    fn run(executions: Vec<Execution>) -> BucketOutcome {
        FifoMatcher::match_bucket(key(InstrumentKind::Equity), executions, Utc::now()).unwrap()
    }

    #[test]
    fn test_oldest_lot_consumed_first() {
        let outcome = run(vec![
            exec(2, Action::Buy, "5", "20", day(2024, 2, 1)),
            exec(3, Action::Sell, "8", "30", day(2024, 3, 1)),
            exec(1, Action::Buy, "5", "10", day(2024, 1, 1)),
        ]);

        let pairs: Vec<(i64, i64, Decimal)> = outcome
            .matches
            .iter()
            .map(|m| {
                (
                    m.buy_execution_id.as_i64(),
                    m.sell_execution_id.as_i64(),
                    m.matched_quantity,
                )
            })
            .collect();
        assert_eq!(pairs, vec![(1, 3, d("5")), (2, 3, d("3"))]);

        let remaining: Vec<(i64, Decimal)> = outcome
            .executions
            .iter()
            .map(|e| (e.id.as_i64(), e.remaining_quantity))
            .collect();
        assert_eq!(
            remaining,
            vec![(1, d("0")), (2, d("2")), (3, d("0"))]
        );
    }

    #[test]
    fn test_equal_times_break_ties_by_id() {
        let t = day(2024, 1, 1);
        let outcome = run(vec![
            exec(9, Action::Buy, "1", "10", t),
            exec(4, Action::Buy, "1", "10", t),
            exec(5, Action::Sell, "1", "12", day(2024, 1, 2)),
        ]);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].buy_execution_id, ExecutionId(4));
    }

    #[test]
    fn test_short_pass_binds_cover_as_buy_side() {
        let outcome = run(vec![
            exec(1, Action::Short, "10", "50", day(2024, 1, 1)),
            exec(2, Action::Cover, "10", "40", day(2024, 2, 1)),
        ]);
        let m = &outcome.matches[0];
        assert_eq!(m.buy_execution_id, ExecutionId(2));
        assert_eq!(m.sell_execution_id, ExecutionId(1));
        assert_eq!(m.matched_price, d("40"));
        assert_eq!(m.acquired_at, day(2024, 1, 1));
        assert_eq!(m.disposed_at, day(2024, 2, 1));
        // proceeds 500 - 1, cost 400 - 1
        assert_eq!(m.proceeds, d("499"));
        assert_eq!(m.cost_basis, d("399"));
        assert_eq!(m.short_term_gain_loss, d("100"));
    }

    #[test]
    fn test_passes_do_not_cross() {
        let outcome = run(vec![
            exec(1, Action::Buy, "10", "10", day(2024, 1, 1)),
            exec(2, Action::Cover, "10", "12", day(2024, 1, 2)),
        ]);
        assert!(outcome.matches.is_empty());
        assert!(outcome.updates.is_empty());
    }

    #[test]
    fn test_zero_remaining_never_matched() {
        let mut spent = exec(1, Action::Buy, "10", "10", day(2024, 1, 1));
        spent.remaining_quantity = Decimal::zero();
        spent.price = None;
        let outcome = run(vec![
            spent,
            exec(2, Action::Buy, "4", "11", day(2024, 1, 2)),
            exec(3, Action::Sell, "4", "12", day(2024, 1, 3)),
        ]);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].buy_execution_id, ExecutionId(2));
        assert!(outcome.matches.iter().all(|m| m.matched_quantity.is_positive()));
    }

    #[test]
    fn test_updates_carry_expected_version() {
        let mut buy = exec(1, Action::Buy, "10", "10", day(2024, 1, 1));
        buy.remaining_quantity = d("6");
        buy.version = 3;
        let outcome = run(vec![buy, exec(2, Action::Sell, "2", "12", day(2024, 1, 3))]);
        assert_eq!(
            outcome.updates,
            vec![
                RemainingUpdate {
                    execution_id: ExecutionId(1),
                    expected_version: 3,
                    remaining_quantity: d("4"),
                },
                RemainingUpdate {
                    execution_id: ExecutionId(2),
                    expected_version: 0,
                    remaining_quantity: d("0"),
                },
            ]
        );
    }

    #[test]
    fn test_missing_price_names_execution() {
        let mut sell = exec(2, Action::Sell, "1", "12", day(2024, 1, 3));
        sell.price = None;
        let err = FifoMatcher::match_bucket(
            key(InstrumentKind::Equity),
            vec![exec(1, Action::Buy, "1", "10", day(2024, 1, 1)), sell],
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                execution_id: ExecutionId(2),
                field: "price",
            }
        );
    }

    #[test]
    fn test_remaining_above_quantity_rejected() {
        let mut buy = exec(1, Action::Buy, "1", "10", day(2024, 1, 1));
        buy.remaining_quantity = d("2");
        let err = FifoMatcher::match_bucket(key(InstrumentKind::Equity), vec![buy], Utc::now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedQuantity { .. }));
        assert_eq!(err.execution_id(), ExecutionId(1));
    }

    #[test]
    fn test_option_bucket_carries_contract_details() {
        let contract = "AAPL240119C00150000";
        let details = OptionDetails {
            contract_id: contract.to_string(),
            underlying: "AAPL".to_string(),
            option_type: OptionType::Call,
            expiration: NaiveDate::from_ymd_opt(2024, 1, 19).unwrap(),
            strike: d("150"),
            shares_per_contract: d("100"),
            premium: Some(d("2.5")),
        };
        let mk = |id: i64, action: Action, price: &str, at: NaiveDateTime| {
            NewExecution::equity(
                OwnerId::new("alice"),
                Portfolio::new("main"),
                Symbol::new(contract),
                action,
                d("1"),
                d(price),
                d("0.65"),
                at,
            )
            .with_option(details.clone())
            .into_execution(ExecutionId(id))
        };
        let outcome = FifoMatcher::match_bucket(
            key(InstrumentKind::Option),
            vec![
                mk(1, Action::Buy, "2.5", day(2024, 1, 2)),
                mk(2, Action::Sell, "3", day(2024, 1, 10)),
            ],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            outcome.matches[0].details,
            MatchDetails::Option {
                contract_id: Some(contract.to_string()),
                premium: Some(d("2.5")),
            }
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::domain::{ExecutionId, NewExecution, OwnerId, Portfolio, Symbol};
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;
    use std::collections::HashMap;

    const ACTIONS: [Action; 4] = [Action::Buy, Action::Sell, Action::Short, Action::Cover];

    fn book(rows: &[(usize, u32, u32, i64)]) -> Vec<Execution> {
        let base = NaiveDate::from_ymd_opt(2022, 1, 3)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(action, qty, cents, day))| {
                NewExecution::equity(
                    OwnerId::new("alice"),
                    Portfolio::new("main"),
                    Symbol::new("AAPL"),
                    ACTIONS[action],
                    Decimal::from(qty as i64),
                    Decimal::from(cents as i64) / Decimal::from(100),
                    Decimal::from_str_canonical("0.99").unwrap(),
                    base + Duration::days(day),
                )
                .into_execution(ExecutionId(i as i64 + 1))
            })
            .collect()
    }

    fn key() -> BucketKey {
        BucketKey {
            owner: OwnerId::new("alice"),
            portfolio: Portfolio::new("main"),
            symbol: Symbol::new("AAPL"),
            instrument: InstrumentKind::Equity,
        }
    }

    proptest! {
        #[test]
        fn prop_quantity_is_conserved(
            rows in prop::collection::vec((0usize..4, 1u32..200, 100u32..50_000, 0i64..800), 1..30),
        ) {
            let executions = book(&rows);
            let outcome = FifoMatcher::match_bucket(key(), executions.clone(), Utc::now()).unwrap();

            let mut matched: HashMap<ExecutionId, Decimal> = HashMap::new();
            for m in &outcome.matches {
                prop_assert!(m.matched_quantity.is_positive());
                *matched.entry(m.buy_execution_id).or_insert(Decimal::zero()) += m.matched_quantity;
                *matched.entry(m.sell_execution_id).or_insert(Decimal::zero()) += m.matched_quantity;
            }
            for e in &outcome.executions {
                let used = matched.get(&e.id).copied().unwrap_or(Decimal::zero());
                prop_assert_eq!(used + e.remaining_quantity, e.quantity);
                prop_assert!(!e.remaining_quantity.is_negative());
            }
        }

        #[test]
        fn prop_pairs_and_gain_split_hold(
            rows in prop::collection::vec((0usize..4, 1u32..200, 100u32..50_000, 0i64..800), 1..30),
        ) {
            let executions = book(&rows);
            let actions: HashMap<ExecutionId, Action> =
                executions.iter().map(|e| (e.id, e.action)).collect();
            let outcome = FifoMatcher::match_bucket(key(), executions, Utc::now()).unwrap();

            for m in &outcome.matches {
                let pair = (actions[&m.buy_execution_id], actions[&m.sell_execution_id]);
                prop_assert!(matches!(
                    pair,
                    (Action::Buy, Action::Sell) | (Action::Cover, Action::Short)
                ));
                prop_assert_eq!(
                    m.short_term_gain_loss + m.long_term_gain_loss,
                    m.proceeds - m.cost_basis
                );
                prop_assert!(m.short_term_gain_loss.is_zero() || m.long_term_gain_loss.is_zero());
            }
        }

        #[test]
        fn prop_one_side_left_open_per_pass(
            rows in prop::collection::vec((0usize..4, 1u32..200, 100u32..50_000, 0i64..800), 1..30),
        ) {
            let outcome = FifoMatcher::match_bucket(key(), book(&rows), Utc::now()).unwrap();
            let open = |action: Action| {
                outcome
                    .executions
                    .iter()
                    .any(|e| e.action == action && e.is_open())
            };
            prop_assert!(!(open(Action::Buy) && open(Action::Sell)));
            prop_assert!(!(open(Action::Short) && open(Action::Cover)));
        }
    }
}
