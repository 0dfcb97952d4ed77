//! HTTP server implementation using Axum.

use crate::handler::{
    create_client, get_client, get_logs, get_stats, get_status, handle_health, list_clients,
    trigger_sync, update_client,
};
use axum::{
    routing::{get, post},
    Router,
};
use socio_sync_core::{CancellationToken, ClientStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    /// Client profiles, run state and report history
    pub store: Arc<dyn ClientStore>,
    /// Parent token for every run the server starts; cancelled on shutdown
    pub shutdown: CancellationToken,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/:id", get(get_client).put(update_client))
        .route("/clients/:id/sync", post(trigger_sync))
        .route("/clients/:id/status", get(get_status))
        .route("/clients/:id/logs", get(get_logs))
        .route("/stats", get(get_stats));

    Router::new()
        .route("/health", get(handle_health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the trigger server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    store: Arc<dyn ClientStore>,
    shutdown: CancellationToken,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let state = Arc::new(AppState { store, shutdown });
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use socio_sync_core::InMemoryClientStore;

    #[tokio::test]
    async fn test_server_starts() {
        let store: Arc<dyn ClientStore> = Arc::new(InMemoryClientStore::new());
        let addr = start_server(store, CancellationToken::new(), "127.0.0.1", 0)
            .await
            .unwrap();
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_invalid_host_rejected() {
        let store: Arc<dyn ClientStore> = Arc::new(InMemoryClientStore::new());
        let result = start_server(store, CancellationToken::new(), "not a host", 0).await;
        assert!(result.is_err());
    }
}
