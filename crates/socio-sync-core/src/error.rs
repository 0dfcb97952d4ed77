//! Error types for socio synchronization.
//!
//! Whether an error ends the run depends on where it is raised: failures in
//! the connect and load steps abort it, failures applying a single record
//! are wrapped with [`SyncError::apply`] and surfaced through the run report.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the sync library.
#[derive(Debug, Error)]
pub enum SyncError {
    // Run-level failures
    #[error("Failed to connect to {target}: {message}")]
    Connectivity { target: String, message: String },

    #[error("Failed to load socios from ledger: {message}")]
    Load {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Failed to scan socio row: {message}")]
    RowScan { message: String },

    #[error("Sync cancelled: {reason}")]
    Cancelled { reason: String },

    // Remote directory errors
    #[error("CRM API error during {operation}: {code} - {description}")]
    RemoteApi {
        operation: String,
        code: String,
        description: String,
    },

    #[error("Unexpected status {status} during {operation}: {body}")]
    HttpStatus {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Failed to {operation} socio {key}: {cause}")]
    Apply {
        operation: String,
        key: String,
        cause: String,
    },

    // Transport / storage errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Client not found: {client_id}")]
    ClientNotFound { client_id: String },

    #[error("Sync already running for client {client_id}")]
    AlreadyRunning { client_id: String },

    #[error("Client {client_id} is disabled")]
    ClientDisabled { client_id: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(Duration::from_secs(0))
        } else {
            SyncError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl SyncError {
    /// Wrap a per-record remote failure with the operation and key it hit.
    pub fn apply(operation: &str, key: &str, cause: &SyncError) -> Self {
        SyncError::Apply {
            operation: operation.to_string(),
            key: key.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Whether the error came from cancellation or the run deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SyncError::Cancelled { .. })
    }

    /// HTTP status code used by the trigger server.
    pub fn http_status(&self) -> u16 {
        match self {
            SyncError::ClientNotFound { .. } => 404,
            SyncError::AlreadyRunning { .. } | SyncError::ClientDisabled { .. } => 409,
            SyncError::Validation { .. } | SyncError::Config { .. } => 400,
            SyncError::Connectivity { .. }
            | SyncError::Network { .. }
            | SyncError::Timeout(_)
            | SyncError::HttpStatus { .. }
            | SyncError::RemoteApi { .. } => 502,
            _ => 500,
        }
    }
}
