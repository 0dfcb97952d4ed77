//! Starting runs for registered clients, on demand or on a fixed interval.

use socio_sync_core::{
    run_sync, CancellationToken, ClientStore, RunReport, SyncConfig, SyncError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Claim the client for a run and return its sync settings.
///
/// Fails with `ClientNotFound`, `ClientDisabled` or `AlreadyRunning`.
pub async fn begin_run(store: &dyn ClientStore, client_id: &str) -> socio_sync_core::Result<SyncConfig> {
    let profile = store.get(client_id).await?;
    if !profile.enabled {
        return Err(SyncError::ClientDisabled {
            client_id: client_id.to_string(),
        });
    }
    store.mark_running(client_id).await?;
    Ok(profile.sync_config())
}

/// Execute a claimed run and store its report.
pub async fn complete_run(
    store: Arc<dyn ClientStore>,
    config: SyncConfig,
    token: CancellationToken,
) -> RunReport {
    let report = run_sync(&config, &token).await;
    if let Err(e) = store.record_report(&config.client_id, report.clone()).await {
        error!("Failed to store report for {}: {}", config.client_id, e);
    }
    report
}

/// Run a claimed sync in the background.
pub fn spawn_run(
    store: Arc<dyn ClientStore>,
    config: SyncConfig,
    token: CancellationToken,
) -> JoinHandle<RunReport> {
    tokio::spawn(complete_run(store, config, token))
}

/// Sync `client_id` every `interval` until `token` is cancelled.
///
/// A tick that finds the client already running is skipped.
pub async fn run_every(
    store: Arc<dyn ClientStore>,
    client_id: String,
    interval: Duration,
    token: CancellationToken,
) {
    info!(
        "Scheduling sync for {} every {} minute(s)",
        client_id,
        interval.as_secs() / 60
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if token.is_cancelled() {
            break;
        }

        let config = match begin_run(store.as_ref(), &client_id).await {
            Ok(config) => config,
            Err(SyncError::AlreadyRunning { .. }) => {
                warn!("Sync for {} still running; skipping this tick", client_id);
                continue;
            }
            Err(SyncError::ClientDisabled { .. }) => {
                debug!("Client {} is disabled; skipping this tick", client_id);
                continue;
            }
            Err(e) => {
                error!("Scheduled sync for {} not started: {}", client_id, e);
                continue;
            }
        };

        let report = complete_run(store.clone(), config, token.clone()).await;
        if !report.success {
            warn!("Scheduled sync for {} failed: {:?}", client_id, report.errors);
        }
    }

    info!("Scheduler for {} stopped", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use socio_sync_core::{ClientProfile, InMemoryClientStore, RunState};
    use tempfile::TempDir;

    async fn store_with_missing_ledger(dir: &TempDir) -> Arc<dyn ClientStore> {
        let store = InMemoryClientStore::new();
        let config = SyncConfig::new(
            "acme",
            dir.path().join("missing.db"),
            "http://127.0.0.1:9/rest/1/token",
        );
        store.create(ClientProfile::from_config(&config)).await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_begin_run_claims_client() {
        let dir = TempDir::new().unwrap();
        let store = store_with_missing_ledger(&dir).await;

        begin_run(store.as_ref(), "acme").await.unwrap();
        let err = begin_run(store.as_ref(), "acme").await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning { .. }));

        let err = begin_run(store.as_ref(), "nobody").await.unwrap_err();
        assert!(matches!(err, SyncError::ClientNotFound { .. }));
    }

    #[tokio::test]
    async fn test_disabled_client_is_not_started() {
        let dir = TempDir::new().unwrap();
        let store = store_with_missing_ledger(&dir).await;
        let mut profile = store.get("acme").await.unwrap();
        profile.enabled = false;
        store.update("acme", profile).await.unwrap();

        let err = begin_run(store.as_ref(), "acme").await.unwrap_err();
        assert!(matches!(err, SyncError::ClientDisabled { .. }));
        assert_eq!(store.status("acme").await.unwrap().state, RunState::Idle);
    }

    #[tokio::test]
    async fn test_complete_run_records_report() {
        let dir = TempDir::new().unwrap();
        let store = store_with_missing_ledger(&dir).await;

        let config = begin_run(store.as_ref(), "acme").await.unwrap();
        let report = spawn_run(store.clone(), config, CancellationToken::new())
            .await
            .unwrap();
        assert!(!report.success);

        let status = store.status("acme").await.unwrap();
        assert_eq!(status.state, RunState::Error);
        assert_eq!(store.history("acme").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_every_stops_when_cancelled() {
        let dir = TempDir::new().unwrap();
        let store = store_with_missing_ledger(&dir).await;
        let token = CancellationToken::new();
        token.cancel();

        run_every(store.clone(), "acme".into(), Duration::from_secs(60), token).await;
        assert!(store.history("acme").await.unwrap().is_empty());
    }
}
