//! Domain types for tax-lot reconciliation.
//!
//! This module provides:
//! - Exact numeric handling via the Decimal wrapper
//! - Domain primitives: identities, OwnerId, Portfolio, Symbol, Action, instrument kinds
//! - Execution and Match records, holding periods
//! - Stable FIFO ordering key for deterministic matching
//! - OCC option symbol parsing

pub mod decimal;
pub mod execution;
pub mod holding;
pub mod occ;
pub mod ordering;
pub mod primitives;
pub mod realized;

pub use decimal::Decimal;
pub use execution::{Execution, LotState, NewExecution, OptionDetails, OptionType};
pub use holding::{days_held, HoldingTerm, LONG_TERM_THRESHOLD_DAYS};
pub use occ::{parse_occ_symbol, OccParseError};
pub use ordering::{sort_executions_fifo, ExecutionOrderingKey};
pub use primitives::{
    now_millis, Action, ActionParseError, DateRange, ExecutionId, InstrumentKind, MatchId,
    MatchKind, OwnerId, Portfolio, Symbol,
};
pub use realized::{Match, MatchContent, MatchDetails, NewMatch};
