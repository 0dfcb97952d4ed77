//! Socio Sync - mirrors ledger socios into the CRM.
//!
//! With `--once` the binary runs a single sync and prints the report as
//! JSON. Otherwise it serves the HTTP trigger API and, when an interval is
//! set, syncs the configured client on a timer.

mod handler;
mod scheduler;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use socio_sync_core::{
    run_sync, CancellationToken, ClientProfile, ClientStore, InMemoryClientStore, LedgerConfig,
    RemoteConfig, SyncConfig, SyncDefaults,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "socio-sync")]
#[command(about = "Synchronize ledger socios into the CRM")]
struct Args {
    /// JSON config file; replaces the connection flags below
    #[arg(short, long, env = "SOCIO_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the ledger database
    #[arg(long, env = "SAGE_DB_PATH")]
    ledger_path: Option<PathBuf>,

    /// Ledger company code (informational)
    #[arg(long, env = "EMPRESA_SAGE")]
    company_code: Option<String>,

    /// CRM webhook base URL
    #[arg(long, env = "BITRIX_ENDPOINT")]
    endpoint: Option<String>,

    /// CRM custom-entity type id
    #[arg(long, env = "BITRIX_ENTITY_TYPE_ID", default_value_t = SyncDefaults::ENTITY_TYPE_ID)]
    entity_type_id: i64,

    /// Client label used in reports and the API
    #[arg(long, env = "EMPRESA_BITRIX", default_value = "default")]
    client_id: String,

    /// Overall run deadline in seconds
    #[arg(long, env = "SYNC_RUN_TIMEOUT_SECS")]
    run_timeout_secs: Option<u64>,

    /// Minutes between scheduled syncs (0 = no schedule)
    #[arg(long, env = "SYNC_INTERVAL_MINUTES", default_value_t = SyncDefaults::INTERVAL_MINUTES)]
    interval_minutes: u64,

    /// Run one sync, print the report and exit
    #[arg(long)]
    once: bool,

    /// Host to bind to
    #[arg(long, env = "API_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, env = "API_PORT", default_value = "8080")]
    port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// Sync settings from the config file or the connection flags.
    ///
    /// Returns `None` when neither names a ledger and an endpoint.
    fn sync_config(&self) -> Result<Option<SyncConfig>> {
        if let Some(path) = &self.config {
            let config = SyncConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            return Ok(Some(config));
        }

        let (Some(ledger_path), Some(endpoint)) = (&self.ledger_path, &self.endpoint) else {
            return Ok(None);
        };

        let mut remote = RemoteConfig::new(endpoint.clone());
        remote.entity_type_id = self.entity_type_id;

        let config = SyncConfig {
            client_id: self.client_id.clone(),
            ledger: LedgerConfig {
                path: ledger_path.clone(),
                company_code: self.company_code.clone(),
            },
            remote,
            run_timeout_secs: self.run_timeout_secs,
        };
        config.validate()?;
        Ok(Some(config))
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = args.sync_config()?;
    let shutdown = CancellationToken::new();

    if args.once {
        let config = config.context("--once needs --config or both --ledger-path and --endpoint")?;
        let report = run_sync(&config, &shutdown).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting socio sync server");

    let store: Arc<dyn ClientStore> = Arc::new(InMemoryClientStore::new());
    if let Some(config) = &config {
        store.create(ClientProfile::from_config(config)).await?;
        info!("Registered client {} from configuration", config.client_id);

        if args.interval_minutes > 0 {
            let interval = Duration::from_secs(args.interval_minutes * 60);
            tokio::spawn(scheduler::run_every(
                store.clone(),
                config.client_id.clone(),
                interval,
                shutdown.clone(),
            ));
        }
    } else {
        warn!("No ledger/endpoint configured; clients must be registered through the API");
    }

    let addr = server::start_server(store, shutdown.clone(), &args.host, args.port).await?;
    info!("API available at http://{}/api/v1", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    shutdown.cancel();

    Ok(())
}
