//! OCC option symbology: ROOT + YYMMDD + C/P + strike.

use crate::domain::{Decimal, OptionDetails, OptionType};
use chrono::NaiveDate;
use thiserror::Error;

/// Standard equity option multiplier.
pub const DEFAULT_SHARES_PER_CONTRACT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OccParseError {
    #[error("not an OCC option symbol: {0}")]
    Format(String),
    #[error("invalid expiration date in option symbol: {0}")]
    Expiration(String),
    #[error("invalid strike in option symbol: {0}")]
    Strike(String),
}

/// Parse an OCC option symbol such as `AAPL240119C00150000` or `SPY250321P450.5`.
///
/// The strike is either the padded 8-digit form (thousandths of a dollar) or a
/// plain decimal.
pub fn parse_occ_symbol(raw: &str) -> Result<OptionDetails, OccParseError> {
    let cleaned: String = raw
        .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
        .trim_end()
        .to_ascii_uppercase();

    // Find the C/P marker preceded by six date digits; the root is everything before.
    let bytes = cleaned.as_bytes();
    let marker = (7..bytes.len())
        .rev()
        .find(|&i| {
            (bytes[i] == b'C' || bytes[i] == b'P')
                && bytes[i - 6..i].iter().all(|b| b.is_ascii_digit())
        })
        .ok_or_else(|| OccParseError::Format(raw.to_string()))?;

    let root = &cleaned[..marker - 6];
    let date_part = &cleaned[marker - 6..marker];
    let strike_part = &cleaned[marker + 1..];

    if root.is_empty() || !root.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(OccParseError::Format(raw.to_string()));
    }
    if strike_part.is_empty()
        || !strike_part.chars().all(|c| c.is_ascii_digit() || c == '.')
        || strike_part.matches('.').count() > 1
    {
        return Err(OccParseError::Format(raw.to_string()));
    }

    let year: i32 = 2000 + parse_digits(&date_part[0..2], raw)?;
    let month: u32 = parse_digits(&date_part[2..4], raw)? as u32;
    let day: u32 = parse_digits(&date_part[4..6], raw)? as u32;
    let expiration = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| OccParseError::Expiration(raw.to_string()))?;

    let strike = parse_strike(strike_part).ok_or_else(|| OccParseError::Strike(raw.to_string()))?;

    let option_type = if bytes[marker] == b'C' {
        OptionType::Call
    } else {
        OptionType::Put
    };

    Ok(OptionDetails {
        contract_id: cleaned.clone(),
        underlying: root.to_string(),
        option_type,
        expiration,
        strike,
        shares_per_contract: Decimal::from(DEFAULT_SHARES_PER_CONTRACT),
        premium: None,
    })
}

fn parse_digits(s: &str, raw: &str) -> Result<i32, OccParseError> {
    s.parse::<i32>()
        .map_err(|_| OccParseError::Expiration(raw.to_string()))
}

fn parse_strike(s: &str) -> Option<Decimal> {
    if s.contains('.') {
        return Decimal::from_str_canonical(s).ok();
    }
    // Bare digits: padded thousandths when 8 digits long, whole dollars otherwise.
    let value = Decimal::from_str_canonical(s).ok()?;
    if s.len() == 8 {
        Some(value / Decimal::from(1000))
    } else {
        Some(value)
    }
}
