//! Domain primitives: identities, owner/portfolio/symbol, Action, instrument kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Store-assigned execution identity. Also the FIFO tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub i64);

impl ExecutionId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned match identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchId(pub i64);

impl MatchId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account owner (the authenticated user id upstream).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(owner: impl Into<String>) -> Self {
        OwnerId(owner.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Portfolio name, unique per owner.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Portfolio(pub String);

impl Portfolio {
    pub fn new(name: impl Into<String>) -> Self {
        Portfolio(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Portfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instrument symbol (ticker, or OCC symbol for options).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Symbol(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Opens a long position.
    Buy,
    /// Closes a long position.
    Sell,
    /// Opens a short position.
    Short,
    /// Closes a short position.
    Cover,
}

impl Action {
    /// True for actions that open a position (Buy, Short).
    pub fn is_opening(&self) -> bool {
        matches!(self, Action::Buy | Action::Short)
    }

    /// True for actions on the buy side of a match (Buy, Cover).
    pub fn is_buy_side(&self) -> bool {
        matches!(self, Action::Buy | Action::Cover)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Short => "short",
            Action::Cover => "cover",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized action: {0}")]
pub struct ActionParseError(pub String);

const BUY_ALIASES: &[&str] = &[
    "BUY",
    "BOUGHT",
    "BUY TO OPEN",
    "BUY OPEN",
    "BUY LONG",
    "OPEN LONG",
    "PURCHASE",
    "YOU BOUGHT",
    "LONG",
];

const COVER_ALIASES: &[&str] = &[
    "COVER",
    "BUYTOCOVER",
    "BUY TO COVER",
    "BTC",
    "BC",
    "BUY TO CLOSE",
    "CLOSE SHORT",
    "SHORT COVER",
];

const SELL_ALIASES: &[&str] = &[
    "SELL",
    "SOLD",
    "SELL TO CLOSE",
    "SELL CLOSE",
    "CLOSE LONG",
    "YOU SOLD",
    "SELL LONG",
];

const SHORT_ALIASES: &[&str] = &[
    "SHORT",
    "SELLSHORT",
    "SELL SHORT",
    "SS",
    "SELL TO OPEN",
    "SHORT SELL",
    "OPEN SHORT",
];

/// Accepts canonical names and common broker statement spellings, case-insensitively.
impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        let table: [(&[&str], Action); 4] = [
            (BUY_ALIASES, Action::Buy),
            (COVER_ALIASES, Action::Cover),
            (SELL_ALIASES, Action::Sell),
            (SHORT_ALIASES, Action::Short),
        ];
        table
            .iter()
            .find(|(aliases, _)| aliases.contains(&normalized.as_str()))
            .map(|(_, action)| *action)
            .ok_or_else(|| ActionParseError(s.to_string()))
    }
}

/// Instrument variant of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Equity,
    Option,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Equity => "equity",
            InstrumentKind::Option => "option",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "equity" => Some(InstrumentKind::Equity),
            "option" => Some(InstrumentKind::Option),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match variant tag, mirrors the instrument kind of the matched executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Stock,
    Option,
}

impl MatchKind {
    pub const ALL: [MatchKind; 2] = [MatchKind::Stock, MatchKind::Option];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Stock => "stock",
            MatchKind::Option => "option",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stock" => Some(MatchKind::Stock),
            "option" => Some(MatchKind::Option),
            _ => None,
        }
    }
}

impl From<InstrumentKind> for MatchKind {
    fn from(kind: InstrumentKind) -> Self {
        match kind {
            InstrumentKind::Equity => MatchKind::Stock,
            InstrumentKind::Option => MatchKind::Option,
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive time range over match timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Current time truncated to millisecond precision, the resolution stores keep.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
