//! Partition executions into independent matching buckets.

use crate::domain::{Execution, InstrumentKind, OwnerId, Portfolio, Symbol};
use std::collections::BTreeMap;

/// Matching scope: executions only ever pair within one bucket.
///
/// Portfolio names are unique per owner only, so the owner is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub owner: OwnerId,
    pub portfolio: Portfolio,
    pub symbol: Symbol,
    pub instrument: InstrumentKind,
}

impl BucketKey {
    pub fn of(execution: &Execution) -> Self {
        BucketKey {
            owner: execution.owner.clone(),
            portfolio: execution.portfolio.clone(),
            symbol: execution.symbol.clone(),
            instrument: execution.instrument,
        }
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.owner, self.portfolio, self.symbol, self.instrument
        )
    }
}

/// Group executions by bucket. Pure partition; order within a bucket is preserved.
pub fn group_into_buckets(executions: Vec<Execution>) -> BTreeMap<BucketKey, Vec<Execution>> {
    let mut buckets: BTreeMap<BucketKey, Vec<Execution>> = BTreeMap::new();
    for execution in executions {
        buckets
            .entry(BucketKey::of(&execution))
            .or_default()
            .push(execution);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, Decimal, ExecutionId, NewExecution, OptionDetails, OptionType};
    use chrono::NaiveDate;

    fn make(id: i64, owner: &str, portfolio: &str, symbol: &str, option: bool) -> Execution {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut new = NewExecution::equity(
            OwnerId::new(owner),
            Portfolio::new(portfolio),
            Symbol::new(symbol),
            Action::Buy,
            Decimal::from(1),
            Decimal::from(1),
            Decimal::zero(),
            at,
        );
        if option {
            new = new.with_option(OptionDetails {
                contract_id: symbol.to_string(),
                underlying: symbol.to_string(),
                option_type: OptionType::Call,
                expiration: at.date(),
                strike: Decimal::from(1),
                shares_per_contract: Decimal::from(100),
                premium: None,
            });
        }
        new.into_execution(ExecutionId(id))
    }

    #[test]
    fn test_partitions_by_full_key() {
        let execs = vec![
            make(1, "alice", "main", "AAPL", false),
            make(2, "alice", "main", "AAPL", false),
            make(3, "alice", "ira", "AAPL", false),
            make(4, "alice", "main", "AAPL", true),
            make(5, "bob", "main", "AAPL", false),
            make(6, "alice", "main", "MSFT", false),
        ];
        let buckets = group_into_buckets(execs);
        assert_eq!(buckets.len(), 5);

        let key = BucketKey {
            owner: OwnerId::new("alice"),
            portfolio: Portfolio::new("main"),
            symbol: Symbol::new("AAPL"),
            instrument: InstrumentKind::Equity,
        };
        let ids: Vec<i64> = buckets[&key].iter().map(|e| e.id.as_i64()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_every_execution_lands_in_exactly_one_bucket() {
        let execs: Vec<Execution> = (1..=20)
            .map(|i| make(i, if i % 2 == 0 { "a" } else { "b" }, "p", "X", i % 3 == 0))
            .collect();
        let buckets = group_into_buckets(execs);
        let total: usize = buckets.values().map(Vec::len).sum();
        assert_eq!(total, 20);
        for (key, members) in &buckets {
            assert!(members.iter().all(|e| BucketKey::of(e) == *key));
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(group_into_buckets(Vec::new()).is_empty());
    }
}
