//! Batch ingestion of broker executions.

use thiserror::Error;

pub mod csv;

pub use self::csv::CsvImporter;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("line {line}: {reason}")]
    Row { line: u64, reason: String },
    #[error("csv parse error: {0}")]
    Csv(#[from] ::csv::Error),
}
