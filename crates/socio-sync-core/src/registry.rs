//! Client registry for the trigger server.
//!
//! Each client is one ledger/CRM pair. The store keeps the profile, the
//! current run state and a bounded history of run reports.

use crate::config::{LedgerConfig, RemoteConfig, SyncConfig, SyncDefaults};
use crate::error::{Result, SyncError};
use crate::sync::RunReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::info;

/// Connection settings for one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub ledger: LedgerConfig,
    pub remote: RemoteConfig,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl ClientProfile {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            id: config.client_id.clone(),
            name: config.client_id.clone(),
            ledger: config.ledger.clone(),
            remote: config.remote.clone(),
            enabled: true,
            run_timeout_secs: config.run_timeout_secs,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            client_id: self.id.clone(),
            ledger: self.ledger.clone(),
            remote: self.remote.clone(),
            run_timeout_secs: self.run_timeout_secs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.sync_config().validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Syncing,
    Completed,
    Error,
}

/// Current state of a client's sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub client_id: String,
    pub state: RunState,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_report: Option<RunReport>,
}

impl SyncStatus {
    fn idle(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            state: RunState::Idle,
            last_sync: None,
            last_report: None,
        }
    }
}

/// Totals across all clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_clients: usize,
    pub enabled_clients: usize,
    pub syncing_count: usize,
    pub total_runs: usize,
    pub failed_runs: usize,
    /// Sum of `processed_count` over each client's latest report.
    pub total_socios: usize,
}

/// Storage for client profiles and their run state.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// All clients, ordered by id.
    async fn list(&self) -> Vec<ClientProfile>;

    async fn get(&self, client_id: &str) -> Result<ClientProfile>;

    /// Register a new client. Fails if the id is taken.
    async fn create(&self, profile: ClientProfile) -> Result<ClientProfile>;

    /// Replace an existing client's profile.
    async fn update(&self, client_id: &str, profile: ClientProfile) -> Result<ClientProfile>;

    async fn status(&self, client_id: &str) -> Result<SyncStatus>;

    /// Flag a run as started. Fails with `AlreadyRunning` if one is active.
    async fn mark_running(&self, client_id: &str) -> Result<()>;

    /// Store a finished run and clear the running flag.
    async fn record_report(&self, client_id: &str, report: RunReport) -> Result<()>;

    /// Past reports, newest first.
    async fn history(&self, client_id: &str) -> Result<Vec<RunReport>>;

    async fn stats(&self) -> RegistryStats;
}

struct ClientEntry {
    profile: ClientProfile,
    status: SyncStatus,
    history: VecDeque<RunReport>,
}

/// [`ClientStore`] kept in process memory.
pub struct InMemoryClientStore {
    clients: RwLock<HashMap<String, ClientEntry>>,
    history_limit: usize,
}

impl Default for InMemoryClientStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryClientStore {
    pub fn new() -> Self {
        Self::with_history_limit(SyncDefaults::REPORT_HISTORY)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            history_limit: history_limit.max(1),
        }
    }

    fn not_found(client_id: &str) -> SyncError {
        SyncError::ClientNotFound {
            client_id: client_id.to_string(),
        }
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn list(&self) -> Vec<ClientProfile> {
        let clients = self.clients.read().await;
        let mut profiles: Vec<_> = clients.values().map(|e| e.profile.clone()).collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    async fn get(&self, client_id: &str) -> Result<ClientProfile> {
        let clients = self.clients.read().await;
        clients
            .get(client_id)
            .map(|e| e.profile.clone())
            .ok_or_else(|| Self::not_found(client_id))
    }

    async fn create(&self, profile: ClientProfile) -> Result<ClientProfile> {
        profile.validate()?;

        let mut clients = self.clients.write().await;
        if clients.contains_key(&profile.id) {
            return Err(SyncError::Validation {
                field: "id".into(),
                message: format!("client {} already exists", profile.id),
            });
        }

        info!("Registered client {}", profile.id);
        clients.insert(
            profile.id.clone(),
            ClientEntry {
                status: SyncStatus::idle(&profile.id),
                profile: profile.clone(),
                history: VecDeque::new(),
            },
        );
        Ok(profile)
    }

    async fn update(&self, client_id: &str, mut profile: ClientProfile) -> Result<ClientProfile> {
        profile.id = client_id.to_string();
        profile.validate()?;

        let mut clients = self.clients.write().await;
        let entry = clients
            .get_mut(client_id)
            .ok_or_else(|| Self::not_found(client_id))?;
        entry.profile = profile.clone();
        Ok(profile)
    }

    async fn status(&self, client_id: &str) -> Result<SyncStatus> {
        let clients = self.clients.read().await;
        clients
            .get(client_id)
            .map(|e| e.status.clone())
            .ok_or_else(|| Self::not_found(client_id))
    }

    async fn mark_running(&self, client_id: &str) -> Result<()> {
        let mut clients = self.clients.write().await;
        let entry = clients
            .get_mut(client_id)
            .ok_or_else(|| Self::not_found(client_id))?;

        if entry.status.state == RunState::Syncing {
            return Err(SyncError::AlreadyRunning {
                client_id: client_id.to_string(),
            });
        }
        entry.status.state = RunState::Syncing;
        Ok(())
    }

    async fn record_report(&self, client_id: &str, report: RunReport) -> Result<()> {
        let mut clients = self.clients.write().await;
        let entry = clients
            .get_mut(client_id)
            .ok_or_else(|| Self::not_found(client_id))?;

        entry.status.state = if report.success {
            RunState::Completed
        } else {
            RunState::Error
        };
        entry.status.last_sync = report.end_time.or(Some(report.start_time));
        entry.status.last_report = Some(report.clone());

        entry.history.push_front(report);
        entry.history.truncate(self.history_limit);
        Ok(())
    }

    async fn history(&self, client_id: &str) -> Result<Vec<RunReport>> {
        let clients = self.clients.read().await;
        clients
            .get(client_id)
            .map(|e| e.history.iter().cloned().collect())
            .ok_or_else(|| Self::not_found(client_id))
    }

    async fn stats(&self) -> RegistryStats {
        let clients = self.clients.read().await;
        clients.values().fold(RegistryStats::default(), |mut stats, entry| {
            stats.total_clients += 1;
            if entry.profile.enabled {
                stats.enabled_clients += 1;
            }
            if entry.status.state == RunState::Syncing {
                stats.syncing_count += 1;
            }
            stats.total_runs += entry.history.len();
            stats.failed_runs += entry.history.iter().filter(|r| !r.success).count();
            if let Some(report) = &entry.status.last_report {
                stats.total_socios += report.processed_count;
            }
            stats
        })
    }
}
