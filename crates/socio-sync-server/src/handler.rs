//! REST handlers for the client registry and run triggers.

use crate::scheduler::{begin_run, spawn_run};
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use socio_sync_core::{ClientProfile, SyncError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error body returned by every handler.
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn list_clients(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let clients = state.store.list().await;
    Json(json!({ "clients": clients }))
}

pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(profile): Json<ClientProfile>,
) -> ApiResult<impl IntoResponse> {
    let profile = state.store.create(profile).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ClientProfile>> {
    Ok(Json(state.store.get(&id).await?))
}

pub async fn update_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(profile): Json<ClientProfile>,
) -> ApiResult<Json<ClientProfile>> {
    Ok(Json(state.store.update(&id, profile).await?))
}

/// Start a run in the background. Returns 202 once the client is claimed.
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let config = begin_run(state.store.as_ref(), &id).await?;
    info!("Sync triggered for client {}", id);

    spawn_run(state.store.clone(), config, state.shutdown.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"message": "Sync started", "status": "syncing"})),
    ))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.status(&id).await?))
}

/// Report history, newest first.
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let logs = state.store.history(&id).await?;
    Ok(Json(json!({ "logs": logs })))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.stats().await)
}
