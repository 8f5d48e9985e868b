//! Stable FIFO ordering for deterministic matching.

use crate::domain::{Execution, ExecutionId};
use chrono::NaiveDateTime;

/// Stable ordering key for executions.
///
/// Ordering: executed_at -> id. Ids are assigned in ingestion order, so
/// executions sharing a timestamp are consumed in the order they were recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExecutionOrderingKey {
    /// Execution time (primary sort).
    pub executed_at: NaiveDateTime,
    /// Execution identity (tie-breaker).
    pub id: ExecutionId,
}

impl ExecutionOrderingKey {
    pub fn from_execution(execution: &Execution) -> Self {
        ExecutionOrderingKey {
            executed_at: execution.executed_at,
            id: execution.id,
        }
    }
}

/// Sort executions earliest first.
pub fn sort_executions_fifo(executions: &mut [Execution]) {
    executions.sort_by_key(ExecutionOrderingKey::from_execution);
}
