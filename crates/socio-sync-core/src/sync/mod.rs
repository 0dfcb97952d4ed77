//! Reconciliation of ledger socios into the CRM.

mod engine;
mod report;
mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{classify, plan, reconcile, RemoteIndex, SkipReason, SyncAction};
pub use report::RunReport;
pub use service::{run_sync, SyncService};
