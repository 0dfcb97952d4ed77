//! Webhook client for the CRM's custom-entity REST methods.
//!
//! Every call is a JSON POST to `{base}/{method}`. Any non-2xx status is a
//! hard failure for that call regardless of body; a 2xx body may still carry
//! an error envelope, which is turned into [`SyncError::RemoteApi`].

use super::fields::{record_from_item, record_to_fields};
use super::RemoteDirectory;
use crate::config::{FieldMapping, RemoteConfig, SyncDefaults};
use crate::error::{Result, SyncError};
use crate::models::{ApiResponse, ItemList, RemoteRecord, SourceRecord};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const LIST_METHOD: &str = "crm.item.list";
const ADD_METHOD: &str = "crm.item.add";
const UPDATE_METHOD: &str = "crm.item.update";

/// CRM client bound to one entity collection.
pub struct WebhookClient {
    client: Client,
    base_url: String,
    entity_type_id: i64,
    fields: FieldMapping,
    request_timeout: Duration,
    max_pages: usize,
}

impl WebhookClient {
    /// Build a client from remote settings.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let request_timeout = config.request_timeout();
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(SyncDefaults::USER_AGENT)
            .build()
            .map_err(|e| SyncError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            entity_type_id: config.entity_type_id,
            fields: config.fields.clone(),
            request_timeout,
            max_pages: SyncDefaults::LIST_MAX_PAGES,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    fn transport_error(&self, operation: &str, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.request_timeout)
        } else {
            SyncError::Network {
                message: format!("{} failed: {}", operation, err),
                source: Some(err),
            }
        }
    }

    /// POST `body` to `method` and decode the envelope.
    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<ApiResponse<T>> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::HttpStatus {
                operation: method.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(method, e))?;
        serde_json::from_slice(&bytes).map_err(|e| SyncError::Json {
            message: format!("Failed to decode {} response: {}", method, e),
            source: Some(e),
        })
    }

    /// Probe used when the list probe fails at the transport level.
    ///
    /// Webhook roots answer 404/405 to a bare GET; that still proves the
    /// endpoint is up.
    async fn test_basic_connection(&self) -> Result<()> {
        debug!("Testing basic CRM connectivity at {}", self.base_url);

        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .map_err(|e| SyncError::Connectivity {
                target: "CRM".to_string(),
                message: format!("webhook not responding: {}", e),
            })?;

        let status = response.status();
        if status.is_success()
            || status == StatusCode::NOT_FOUND
            || status == StatusCode::METHOD_NOT_ALLOWED
        {
            info!("CRM webhook is responding (status {})", status.as_u16());
            return Ok(());
        }

        Err(SyncError::Connectivity {
            target: "CRM".to_string(),
            message: format!("webhook not responding: unexpected status {}", status.as_u16()),
        })
    }

    fn map_fields(&self, source: &SourceRecord) -> serde_json::Map<String, Value> {
        record_to_fields(&source.to_remote(), &self.fields)
    }
}

#[async_trait]
impl RemoteDirectory for WebhookClient {
    async fn test_connection(&self) -> Result<()> {
        info!("Testing CRM connection to {}", self.base_url);

        let probe = json!({
            "entityTypeId": self.entity_type_id,
            "start": 0,
            "limit": 1,
        });

        match self.call::<ItemList>(LIST_METHOD, &probe).await {
            Ok(response) => {
                response.into_result(LIST_METHOD)?;
                info!("CRM connection successful");
                Ok(())
            }
            Err(e) => {
                warn!("CRM list probe failed ({}), trying basic connection test", e);
                self.test_basic_connection().await
            }
        }
    }

    async fn list_all(&self) -> Result<Vec<RemoteRecord>> {
        let mut records = Vec::new();
        let mut start: u64 = 0;

        for _ in 0..self.max_pages {
            let body = json!({
                "entityTypeId": self.entity_type_id,
                "start": start,
            });
            let response = self.call::<ItemList>(LIST_METHOD, &body).await?;
            let next = response.next;
            let page = response.into_result(LIST_METHOD)?.unwrap_or_default();

            debug!("Fetched {} CRM items at offset {}", page.items.len(), start);
            records.extend(
                page.items
                    .iter()
                    .map(|item| record_from_item(item, &self.fields)),
            );

            match next {
                Some(offset) if offset > start => start = offset,
                _ => {
                    info!("Found {} existing socios in CRM", records.len());
                    return Ok(records);
                }
            }
        }

        // Never hand back a partial snapshot.
        Err(SyncError::RemoteApi {
            operation: LIST_METHOD.to_string(),
            code: "PAGE_LIMIT".to_string(),
            description: format!(
                "listing still had more items after {} pages (next offset {})",
                self.max_pages, start
            ),
        })
    }

    async fn create(&self, source: &SourceRecord) -> Result<()> {
        debug!("Creating CRM item for {}", source);

        let body = json!({
            "entityTypeId": self.entity_type_id,
            "fields": self.map_fields(source),
        });
        let result = self
            .call::<Value>(ADD_METHOD, &body)
            .await?
            .into_result(ADD_METHOD)?;

        let new_id = result
            .as_ref()
            .and_then(|r| r.pointer("/item/id"))
            .and_then(Value::as_i64);
        debug!("Created CRM item {:?} for DNI={}", new_id, source.national_id);
        Ok(())
    }

    async fn update(&self, remote_id: i64, source: &SourceRecord) -> Result<()> {
        debug!("Updating CRM item {} for {}", remote_id, source);

        let body = json!({
            "entityTypeId": self.entity_type_id,
            "id": remote_id,
            "fields": self.map_fields(source),
        });
        self.call::<Value>(UPDATE_METHOD, &body)
            .await?
            .into_result(UPDATE_METHOD)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base: &str) -> WebhookClient {
        WebhookClient::new(&RemoteConfig::new(base)).unwrap()
    }

    async fn stalled_add(Json(body): Json<Value>) -> Json<Value> {
        if body["fields"]["title"] == "SLOW" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Json(json!({"result": {"item": {"id": 1}}}))
    }

    fn socio(national_id: &str) -> SourceRecord {
        SourceRecord {
            company_code: 1,
            participation_percent: 12.5,
            is_administrator: true,
            administrator_role: String::new(),
            national_id: national_id.to_string(),
            legal_name: String::new(),
        }
    }

    fn item(id: i64, dni: &str) -> Value {
        json!({"id": id, "title": dni, "ufCrm55Dni": dni})
    }

    #[tokio::test]
    async fn test_list_all_follows_next() {
        let app = Router::new().route(
            "/crm.item.list",
            post(|Json(body): Json<Value>| async move {
                let start = body["start"].as_u64().unwrap_or(0);
                if start == 0 {
                    Json(json!({
                        "result": {"items": [item(1, "A"), item(2, "B")]},
                        "next": 2,
                        "total": 3
                    }))
                } else {
                    Json(json!({"result": {"items": [item(3, "C")]}, "total": 3}))
                }
            }),
        );
        let base = spawn_stub(app).await;

        let records = client_for(&base).list_all().await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.remote_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(records[2].national_id, "C");
    }

    #[tokio::test]
    async fn test_list_all_endless_pagination_is_an_error() {
        let app = Router::new().route(
            "/crm.item.list",
            post(|Json(body): Json<Value>| async move {
                let start = body["start"].as_u64().unwrap_or(0);
                Json(json!({
                    "result": {"items": [item(start as i64 + 1, "A")]},
                    "next": start + 1
                }))
            }),
        );
        let base = spawn_stub(app).await;
        let mut client = client_for(&base);
        client.max_pages = 3;

        let err = client.list_all().await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteApi { ref code, .. } if code == "PAGE_LIMIT"));
    }

    #[tokio::test]
    async fn test_list_all_last_page_within_limit() {
        let app = Router::new().route(
            "/crm.item.list",
            post(|Json(body): Json<Value>| async move {
                let start = body["start"].as_u64().unwrap_or(0);
                if start < 2 {
                    Json(json!({"result": {"items": [item(start as i64 + 1, "A")]}, "next": start + 1}))
                } else {
                    Json(json!({"result": {"items": [item(3, "C")]}}))
                }
            }),
        );
        let base = spawn_stub(app).await;
        let mut client = client_for(&base);
        client.max_pages = 3;

        assert_eq!(client.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let app = Router::new().route("/crm.item.add", post(stalled_add));
        let base = spawn_stub(app).await;
        let mut config = RemoteConfig::new(&base);
        config.request_timeout_secs = 1;
        let client = WebhookClient::new(&config).unwrap();

        let err = client.create(&socio("SLOW")).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout(d) if d == Duration::from_secs(1)));
        assert_eq!(err.to_string(), "Request timeout after 1s");
        assert!(client.create(&socio("FAST")).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_all_null_result_is_empty() {
        let app = Router::new().route(
            "/crm.item.list",
            post(|| async { Json(json!({"result": null})) }),
        );
        let base = spawn_stub(app).await;

        assert!(client_for(&base).list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_all_error_envelope() {
        let app = Router::new().route(
            "/crm.item.list",
            post(|| async {
                Json(json!({"error": "ACCESS_DENIED", "error_description": "No rights"}))
            }),
        );
        let base = spawn_stub(app).await;

        let err = client_for(&base).list_all().await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteApi { ref code, .. } if code == "ACCESS_DENIED"));
    }

    #[tokio::test]
    async fn test_create_sends_mapped_fields() {
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let captured = seen.clone();
        let app = Router::new().route(
            "/crm.item.add",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    captured.lock().unwrap().push(body);
                    Json(json!({"result": {"item": {"id": 99}}}))
                }
            }),
        );
        let base = spawn_stub(app).await;

        client_for(&base).create(&socio("12345678A")).await.unwrap();

        let bodies = seen.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        let fields = &bodies[0]["fields"];
        assert_eq!(bodies[0]["entityTypeId"], json!(SyncDefaults::ENTITY_TYPE_ID));
        assert_eq!(fields["title"], json!("12345678A"));
        assert_eq!(fields["ufCrm55Cargo"], json!("No especificado"));
        assert_eq!(fields["ufCrm55Admin"], json!("Y"));
        assert_eq!(fields["ufCrm55Participacion"], json!("12.50"));
    }

    #[tokio::test]
    async fn test_update_addresses_remote_id() {
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let captured = seen.clone();
        let app = Router::new().route(
            "/crm.item.update",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    captured.lock().unwrap().push(body);
                    Json(json!({"result": {"item": {"id": 7}}}))
                }
            }),
        );
        let base = spawn_stub(app).await;

        client_for(&base).update(7, &socio("X")).await.unwrap();
        assert_eq!(seen.lock().unwrap()[0]["id"], json!(7));
    }

    #[tokio::test]
    async fn test_non_success_status_is_hard_failure() {
        let app = Router::new().route(
            "/crm.item.add",
            post(|| async {
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"result": true})),
                )
            }),
        );
        let base = spawn_stub(app).await;

        let err = client_for(&base).create(&socio("X")).await.unwrap_err();
        assert!(matches!(err, SyncError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_connection_ok() {
        let app = Router::new().route(
            "/crm.item.list",
            post(|| async { Json(json!({"result": {"items": []}})) }),
        );
        let base = spawn_stub(app).await;
        assert!(client_for(&base).test_connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_api_error_is_fatal() {
        let app = Router::new().route(
            "/crm.item.list",
            post(|| async {
                Json(json!({"error": "INVALID_CREDENTIALS", "error_description": "Bad token"}))
            }),
        );
        let base = spawn_stub(app).await;

        let err = client_for(&base).test_connection().await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteApi { .. }));
    }

    #[tokio::test]
    async fn test_connection_falls_back_to_basic_probe() {
        let app = Router::new()
            .route(
                "/crm.item.list",
                post(|| async { axum::http::StatusCode::BAD_GATEWAY }),
            )
            .route("/", get(|| async { axum::http::StatusCode::NOT_FOUND }));
        let base = spawn_stub(app).await;

        assert!(client_for(&base).test_connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(&format!("http://{}", addr))
            .test_connection()
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Connectivity { .. }));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = client_for("https://crm.example/rest/1/abc/");
        assert_eq!(client.base_url(), "https://crm.example/rest/1/abc");
        assert_eq!(
            client.method_url(LIST_METHOD),
            "https://crm.example/rest/1/abc/crm.item.list"
        );
    }
}
