pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod orchestration;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Action, Decimal, Execution, ExecutionId, InstrumentKind, Match, MatchDetails, MatchKind,
    NewExecution, NewMatch, OwnerId, Portfolio, Symbol,
};
pub use engine::{FifoMatcher, RealizedSummary};
pub use error::{AppError, ReconcileError, ValidationError};
pub use ingest::CsvImporter;
pub use orchestration::{CommitScope, ReconcileOptions, Reconciler};
pub use store::{ExecutionStore, FetchMode, InMemoryStore, LedgerStore, MatchStore, StoreError};
