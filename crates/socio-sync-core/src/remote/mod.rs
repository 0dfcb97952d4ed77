//! Remote directory: the CRM custom-entity collection socios are pushed to.

mod client;
mod fields;

pub use client::WebhookClient;
pub use fields::{record_from_item, record_to_fields};

use crate::error::Result;
use crate::models::{RemoteRecord, SourceRecord};
use async_trait::async_trait;

/// CRUD surface of the CRM needed by the reconciliation engine.
///
/// Each run owns its own instance; implementations need not be shared
/// across concurrent runs.
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Verify the endpoint is reachable and authorized.
    async fn test_connection(&self) -> Result<()>;

    /// Every record currently in the collection. An empty collection is
    /// `Ok(vec![])`.
    async fn list_all(&self) -> Result<Vec<RemoteRecord>>;

    /// Create the CRM item for `source`.
    async fn create(&self, source: &SourceRecord) -> Result<()>;

    /// Overwrite CRM item `remote_id` with the mapping of `source`.
    async fn update(&self, remote_id: i64, source: &SourceRecord) -> Result<()>;
}
