//! Source reader: the ledger side of the sync.
//!
//! All operations are synchronous to match rusqlite's API.

mod sqlite;

pub use sqlite::SqliteLedger;

use crate::error::Result;
use crate::models::SourceRecord;
use std::collections::HashSet;

/// Read access to the authoritative socio ledger.
pub trait SourceReader: Send + Sync {
    /// Verify the ledger is reachable.
    fn ping(&self) -> Result<()>;

    /// Every valid socio, ordered by national ID ascending.
    ///
    /// Rows that cannot be scanned are logged and skipped.
    fn load_all(&self) -> Result<Vec<SourceRecord>>;

    /// Like [`load_all`](Self::load_all) without the given national IDs.
    fn load_excluding(&self, keys: &HashSet<String>) -> Result<Vec<SourceRecord>>;

    /// Number of valid socios.
    fn count_valid(&self) -> Result<usize>;

    /// A single socio by national ID.
    fn get_by_national_id(&self, national_id: &str) -> Result<Option<SourceRecord>>;
}
