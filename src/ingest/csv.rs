use super::ImportError;
use crate::domain::{
    parse_occ_symbol, Action, Decimal, NewExecution, OccParseError, OwnerId, Portfolio, Symbol,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Deserialize)]
struct Row {
    executed_at: String,
    symbol: String,
    action: String,
    quantity: String,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    commission: Option<String>,
    #[serde(default)]
    portfolio: Option<String>,
}

/// Parses broker CSV exports into executions.
///
/// Missing price or commission is imported as zero. Each row gets an import key so that
/// loading the same file twice inserts nothing the second time.
pub struct CsvImporter;

impl CsvImporter {
    pub fn parse(
        owner: &OwnerId,
        default_portfolio: &Portfolio,
        bytes: &[u8],
    ) -> Result<Vec<NewExecution>, ImportError> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(::csv::Trim::All)
            .from_reader(bytes);
        let headers = reader.headers()?.clone();

        let mut seen: HashMap<String, u32> = HashMap::new();
        let mut executions = Vec::new();

        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let row: Row = record.deserialize(Some(&headers))?;
            let execution = Self::parse_row(owner, default_portfolio, row)
                .map_err(|reason| ImportError::Row { line, reason })?;

            let fingerprint = fingerprint(&execution);
            let ordinal = seen.entry(fingerprint.clone()).or_insert(0);
            let key = import_key(&fingerprint, *ordinal);
            *ordinal += 1;

            executions.push(execution.with_import_key(key));
        }

        tracing::debug!(owner = %owner, rows = executions.len(), "csv parsed");
        Ok(executions)
    }

    fn parse_row(
        owner: &OwnerId,
        default_portfolio: &Portfolio,
        row: Row,
    ) -> Result<NewExecution, String> {
        let action: Action = row.action.parse().map_err(|e| format!("{e}"))?;
        let quantity = parse_decimal("quantity", &row.quantity)?;
        if quantity.is_negative() {
            return Err(format!("negative quantity: {}", row.quantity));
        }
        let price = parse_optional_decimal("price", row.price.as_deref())?;
        let commission = parse_optional_decimal("commission", row.commission.as_deref())?;
        let executed_at = parse_executed_at(&row.executed_at)?;
        let portfolio = row
            .portfolio
            .filter(|p| !p.is_empty())
            .map(Portfolio::new)
            .unwrap_or_else(|| default_portfolio.clone());

        let symbol = row.symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err("empty symbol".to_string());
        }

        match parse_occ_symbol(&symbol) {
            Ok(details) => Ok(NewExecution::equity(
                owner.clone(),
                portfolio,
                Symbol::new(details.contract_id.clone()),
                action,
                quantity,
                price,
                commission,
                executed_at,
            )
            .with_option(details)),
            Err(OccParseError::Format(_)) => Ok(NewExecution::equity(
                owner.clone(),
                portfolio,
                Symbol::new(symbol),
                action,
                quantity,
                price,
                commission,
                executed_at,
            )),
            Err(err) => Err(err.to_string()),
        }
    }
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, String> {
    Decimal::from_str_canonical(&raw.replace(['$', ','], ""))
        .map_err(|e| format!("invalid {field} {raw:?}: {e}"))
}

fn parse_optional_decimal(field: &str, raw: Option<&str>) -> Result<Decimal, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => parse_decimal(field, value),
        None => Ok(Decimal::zero()),
    }
}

fn parse_executed_at(raw: &str) -> Result<NaiveDateTime, String> {
    let raw = raw.trim();
    for format in DATETIME_FORMATS {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(at);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("invalid executed_at {raw:?}"))
}

fn fingerprint(e: &NewExecution) -> String {
    let opt = |d: Option<Decimal>| d.map(|d| d.to_canonical_string()).unwrap_or_default();
    [
        e.owner.as_str().to_string(),
        e.portfolio.as_str().to_string(),
        e.symbol.as_str().to_string(),
        e.action.as_str().to_string(),
        e.quantity.to_canonical_string(),
        opt(e.price),
        opt(e.commission),
        e.executed_at.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
    ]
    .join("\u{1f}")
}

fn import_key(fingerprint: &str, ordinal: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update((fingerprint.len() as u32).to_le_bytes());
    hasher.update(fingerprint.as_bytes());
    hasher.update(ordinal.to_le_bytes());
    let hash = hasher.finalize();
    format!("hash:{}", hex::encode(&hash[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InstrumentKind;

    fn parse(csv: &str) -> Result<Vec<NewExecution>, ImportError> {
        CsvImporter::parse(&OwnerId::new("alice"), &Portfolio::new("main"), csv.as_bytes())
    }

    #[test]
    fn test_parses_equity_rows_with_defaults() {
        let rows = parse(
            "executed_at,symbol,action,quantity,price,commission\n\
             2024-01-02,aapl,Bought,100,10.50,\n\
             2024-01-03 15:30:00,AAPL,sell,100,\"$1,050.00\",1\n",
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol.as_str(), "AAPL");
        assert_eq!(rows[0].action, Action::Buy);
        assert_eq!(rows[0].commission, Some(Decimal::zero()));
        assert_eq!(rows[0].instrument, InstrumentKind::Equity);
        assert_eq!(rows[1].price, Some(Decimal::from(1050)));
        assert_eq!(rows[1].portfolio.as_str(), "main");
    }

    #[test]
    fn test_option_symbol_detected() {
        let rows = parse(
            "executed_at,symbol,action,quantity,price,commission,portfolio\n\
             2024-01-02T09:30:00,AAPL240119C00150000,buy to open,1,2.5,0.65,ira\n",
        )
        .unwrap();
        assert_eq!(rows[0].instrument, InstrumentKind::Option);
        assert_eq!(rows[0].portfolio.as_str(), "ira");
        let details = rows[0].option.as_ref().unwrap();
        assert_eq!(details.strike, Decimal::from(150));
    }

    #[test]
    fn test_identical_rows_get_distinct_keys() {
        let csv = "executed_at,symbol,action,quantity,price,commission\n\
                   2024-01-02,MSFT,buy,1,300,0\n\
                   2024-01-02,MSFT,buy,1,300,0\n";
        let first = parse(csv).unwrap();
        let second = parse(csv).unwrap();
        assert_ne!(first[0].import_key, first[1].import_key);
        assert_eq!(first[0].import_key, second[0].import_key);
        assert_eq!(first[1].import_key, second[1].import_key);
    }

    #[test]
    fn test_unknown_action_reports_line() {
        let err = parse(
            "executed_at,symbol,action,quantity\n\
             2024-01-02,MSFT,buy,1\n\
             2024-01-03,MSFT,dividend,1\n",
        )
        .unwrap_err();
        match err {
            ImportError::Row { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("dividend"));
            }
            other => panic!("expected row error, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_date_rejected() {
        let err = parse("executed_at,symbol,action,quantity\n01/02/2024,MSFT,buy,1\n").unwrap_err();
        assert!(matches!(err, ImportError::Row { line: 2, .. }));
    }
}
