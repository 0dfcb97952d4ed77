//! Run orchestration: connectivity checks, snapshot loads, reconcile.

use super::engine::{bounded, reconcile};
use super::report::RunReport;
use crate::cancel::CancellationToken;
use crate::config::SyncConfig;
use crate::remote::{RemoteDirectory, WebhookClient};
use crate::source::{SourceReader, SqliteLedger};
use tracing::{error, info, warn};

/// One client's sync, wired to a reader and a remote directory.
pub struct SyncService<S, R> {
    client_id: String,
    source: S,
    remote: R,
}

impl<S, R> SyncService<S, R>
where
    S: SourceReader,
    R: RemoteDirectory,
{
    pub fn new(client_id: impl Into<String>, source: S, remote: R) -> Self {
        Self {
            client_id: client_id.into(),
            source,
            remote,
        }
    }

    /// Execute one run and report its outcome.
    ///
    /// Never returns an error: fatal failures produce a report with
    /// `success == false` and the triggering error appended.
    pub async fn run(&self, token: &CancellationToken) -> RunReport {
        let mut report = RunReport::start(&self.client_id);
        info!("Starting socio sync for client {}", self.client_id);

        if let Err(e) = self.source.ping() {
            error!("Ledger connection failed: {}", e);
            return report.fail("failed to connect to ledger", &e);
        }

        if let Err(e) = bounded(token, self.remote.test_connection()).await {
            error!("CRM connection failed: {}", e);
            return report.fail("failed to connect to CRM", &e);
        }

        match self.source.count_valid() {
            Ok(count) => info!("Ledger reports {} valid socios", count),
            Err(e) => warn!("Could not count ledger socios: {}", e),
        }

        let sources = match self.source.load_all() {
            Ok(sources) => sources,
            Err(e) => {
                error!("Loading ledger socios failed: {}", e);
                return report.fail("failed to fetch socios from ledger", &e);
            }
        };
        info!("Fetched {} socios from ledger", sources.len());

        let remotes = match bounded(token, self.remote.list_all()).await {
            Ok(remotes) => remotes,
            Err(e) => {
                error!("Listing CRM socios failed: {}", e);
                return report.fail("failed to fetch socios from CRM", &e);
            }
        };

        report.processed_count = sources.len();

        if let Err(e) = reconcile(&self.remote, &sources, &remotes, token, &mut report).await {
            warn!("Sync for client {} interrupted: {}", self.client_id, e);
            return report.fail("sync interrupted", &e);
        }

        let report = report.finish();
        info!(
            "Sync completed for client {}: processed={}, created={}, updated={}, skipped={}, errors={}, duration={}",
            report.client_id,
            report.processed_count,
            report.created_count,
            report.updated_count,
            report.skipped_count,
            report.errors.len(),
            report.duration
        );
        report
    }
}

/// Run a sync described by `config`.
///
/// Opens the ledger and the webhook client for this run only. Setup
/// failures are reported the same way as run failures.
pub async fn run_sync(config: &SyncConfig, token: &CancellationToken) -> RunReport {
    let token = match config.run_timeout() {
        Some(timeout) => token.child_with_timeout(timeout),
        None => token.clone(),
    };

    if let Err(e) = config.validate() {
        return RunReport::start(&config.client_id).fail("invalid configuration", &e);
    }

    let ledger = match SqliteLedger::open(&config.ledger.path) {
        Ok(ledger) => ledger,
        Err(e) => {
            error!("Opening ledger {} failed: {}", config.ledger.path.display(), e);
            return RunReport::start(&config.client_id).fail("failed to connect to ledger", &e);
        }
    };

    let remote = match WebhookClient::new(&config.remote) {
        Ok(remote) => remote,
        Err(e) => {
            return RunReport::start(&config.client_id).fail("failed to connect to CRM", &e);
        }
    };

    if let Some(company) = &config.ledger.company_code {
        info!("Ledger company code: {}", company);
    }

    SyncService::new(config.client_id.clone(), ledger, remote)
        .run(&token)
        .await
}
