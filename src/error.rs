use crate::config::ConfigError;
use crate::domain::ExecutionId;
use crate::ingest::ImportError;
use crate::store::StoreError;
use thiserror::Error;

/// Malformed execution entering the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("execution {execution_id} is missing {field}")]
    MissingField {
        execution_id: ExecutionId,
        field: &'static str,
    },
    #[error("execution {execution_id} has malformed quantities: {detail}")]
    MalformedQuantity {
        execution_id: ExecutionId,
        detail: String,
    },
}

impl ValidationError {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ValidationError::MissingField { execution_id, .. } => *execution_id,
            ValidationError::MalformedQuantity { execution_id, .. } => *execution_id,
        }
    }
}

/// Failure of a reconciliation run or reset.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

/// Top-level error for the command-line entry point.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),
    #[error("Import failed: {0}")]
    Import(#[from] ImportError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
}
