//! Configuration for sync runs.
//!
//! Constants live on [`SyncDefaults`]; per-client settings are carried by
//! [`SyncConfig`], which can be built in code or read from a JSON file.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default values shared by the library and the binary.
pub struct SyncDefaults;

impl SyncDefaults {
    /// Custom-entity collection holding socios in the CRM.
    pub const ENTITY_TYPE_ID: i64 = 130;
    /// Per-call HTTP timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    /// How long a ledger query waits on a locked database.
    pub const LEDGER_BUSY_TIMEOUT: Duration = Duration::from_secs(10);
    pub const INTERVAL_MINUTES: u64 = 5;
    /// Role written when the ledger has none.
    pub const FALLBACK_ROLE: &'static str = "No especificado";
    /// Hard cap on pages followed by `list_all`.
    pub const LIST_MAX_PAGES: usize = 10_000;
    pub const USER_AGENT: &'static str = "socio-sync/0.1";
    /// Run reports kept per client by the trigger server.
    pub const REPORT_HISTORY: usize = 20;
}

/// Custom-field names of the CRM entity collection.
///
/// The defaults match the deployment the sync was written for; other
/// portals generate different `ufCrm*` names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub id: String,
    pub title: String,
    pub national_id: String,
    pub administrator_role: String,
    pub administrator_flag: String,
    pub participation_percent: String,
    pub legal_name: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            title: "title".to_string(),
            national_id: "ufCrm55Dni".to_string(),
            administrator_role: "ufCrm55Cargo".to_string(),
            administrator_flag: "ufCrm55Admin".to_string(),
            participation_percent: "ufCrm55Participacion".to_string(),
            legal_name: "ufCrm55RazonSocial".to_string(),
        }
    }
}

/// Where the ledger lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub path: PathBuf,
    /// Company code in the ledger; informational, not used to filter.
    #[serde(default)]
    pub company_code: Option<String>,
}

/// Remote directory endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Webhook base address, e.g. `https://portal.example/rest/1/token`.
    pub endpoint: String,
    #[serde(default = "default_entity_type_id")]
    pub entity_type_id: i64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub fields: FieldMapping,
}

impl RemoteConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            entity_type_id: SyncDefaults::ENTITY_TYPE_ID,
            request_timeout_secs: SyncDefaults::REQUEST_TIMEOUT.as_secs(),
            fields: FieldMapping::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_entity_type_id() -> i64 {
    SyncDefaults::ENTITY_TYPE_ID
}

fn default_request_timeout_secs() -> u64 {
    SyncDefaults::REQUEST_TIMEOUT.as_secs()
}

/// Everything one run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Label for the run report; never used to filter records.
    pub client_id: String,
    pub ledger: LedgerConfig,
    pub remote: RemoteConfig,
    /// Overall run deadline in seconds.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl SyncConfig {
    pub fn new(
        client_id: impl Into<String>,
        ledger_path: impl Into<PathBuf>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            ledger: LedgerConfig {
                path: ledger_path.into(),
                company_code: None,
            },
            remote: RemoteConfig::new(endpoint),
            run_timeout_secs: None,
        }
    }

    /// Read and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| SyncError::Config {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let config: SyncConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Check required settings are present and well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(SyncError::Validation {
                field: "client_id".into(),
                message: "must not be empty".into(),
            });
        }
        if self.ledger.path.as_os_str().is_empty() {
            return Err(SyncError::Validation {
                field: "ledger.path".into(),
                message: "ledger path is required".into(),
            });
        }
        if self.remote.endpoint.trim().is_empty() {
            return Err(SyncError::Validation {
                field: "remote.endpoint".into(),
                message: "CRM endpoint is required".into(),
            });
        }
        let url = url::Url::parse(&self.remote.endpoint).map_err(|e| SyncError::Validation {
            field: "remote.endpoint".into(),
            message: format!("invalid URL: {}", e),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::Validation {
                field: "remote.endpoint".into(),
                message: format!("unsupported scheme: {}", url.scheme()),
            });
        }
        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::Validation {
                field: "remote.request_timeout_secs".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
