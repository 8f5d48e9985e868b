//! Reconciliation runs over a ledger store.

pub mod locks;
pub mod reconciler;

pub use locks::{OwnerLocks, RunGuard};
pub use reconciler::{CommitScope, ReconcileOptions, Reconciler};
