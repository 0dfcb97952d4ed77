//! Socio Sync Core - Headless library that mirrors ledger socios into a CRM.
//!
//! The ledger is authoritative. A run reads every valid socio from it, reads
//! every item of the CRM's custom-entity collection, joins them by national
//! ID (DNI), and creates or updates CRM items so they match. Nothing is ever
//! deleted on either side.
//!
//! The HTTP trigger server lives in the `socio-sync-server` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use socio_sync_core::{run_sync, CancellationToken, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> socio_sync_core::Result<()> {
//!     let config = SyncConfig::from_file("sync.json")?;
//!     let report = run_sync(&config, &CancellationToken::new()).await;
//!
//!     println!(
//!         "created={} updated={} errors={}",
//!         report.created_count,
//!         report.updated_count,
//!         report.errors.len()
//!     );
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod models;
pub mod registry;
pub mod remote;
pub mod source;
pub mod sync;

pub use cancel::{CancellationToken, CancelledError};
pub use config::{FieldMapping, LedgerConfig, RemoteConfig, SyncConfig, SyncDefaults};
pub use error::{Result, SyncError};
pub use models::{RemoteRecord, SourceRecord};
pub use registry::{ClientProfile, ClientStore, InMemoryClientStore, RegistryStats, RunState, SyncStatus};
pub use remote::{RemoteDirectory, WebhookClient};
pub use source::{SourceReader, SqliteLedger};
pub use sync::{classify, plan, run_sync, RunReport, SyncAction, SyncService};
