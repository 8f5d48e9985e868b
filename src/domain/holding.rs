//! Holding period of a lot, measured in calendar days.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Days held at or above which a gain is long-term.
pub const LONG_TERM_THRESHOLD_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingTerm {
    ShortTerm,
    LongTerm,
}

impl HoldingTerm {
    pub fn from_days(days_held: i64) -> Self {
        if days_held < LONG_TERM_THRESHOLD_DAYS {
            HoldingTerm::ShortTerm
        } else {
            HoldingTerm::LongTerm
        }
    }
}

/// Calendar days between two execution dates; time of day is discarded.
pub fn days_held(acquired: NaiveDateTime, disposed: NaiveDateTime) -> i64 {
    disposed
        .date()
        .signed_duration_since(acquired.date())
        .num_days()
}
