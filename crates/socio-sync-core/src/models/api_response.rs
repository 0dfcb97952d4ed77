//! Generic CRM response envelope.
//!
//! Every webhook method answers with the same outer shape: a `result`
//! payload or an `error`. Error extraction lives here once instead of on
//! each payload type.

use crate::error::{Result, SyncError};
use serde::Deserialize;

/// The `error` member of a response.
///
/// Portals send either a bare code next to a top-level `error_description`,
/// or a nested object carrying both.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ApiErrorField {
    Code(String),
    Detailed {
        error: String,
        #[serde(default)]
        error_description: String,
    },
}

/// Outer envelope of a CRM webhook response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<ApiErrorField>,
    #[serde(default)]
    pub error_description: Option<String>,
    /// Offset of the next page for paged list methods.
    #[serde(default)]
    pub next: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl<T> ApiResponse<T> {
    /// The error code and description, if the envelope carries an error.
    pub fn api_error(&self) -> Option<(String, String)> {
        match &self.error {
            Some(ApiErrorField::Code(code)) if !code.is_empty() => Some((
                code.clone(),
                self.error_description.clone().unwrap_or_default(),
            )),
            Some(ApiErrorField::Detailed {
                error,
                error_description,
            }) if !error.is_empty() => Some((error.clone(), error_description.clone())),
            _ => None,
        }
    }

    /// Turn the envelope into its payload, or a `RemoteApi` error.
    ///
    /// A `null` or missing result is `Ok(None)`, not an error.
    pub fn into_result(self, operation: &str) -> Result<Option<T>> {
        if let Some((code, description)) = self.api_error() {
            return Err(SyncError::RemoteApi {
                operation: operation.to_string(),
                code,
                description,
            });
        }
        Ok(self.result)
    }
}

/// Payload of `crm.item.list`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ItemList {
    #[serde(default)]
    pub items: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_payload() {
        let json = r#"{"result": {"items": [{"id": 1}], "total": 1}, "total": 1}"#;
        let response: ApiResponse<ItemList> = serde_json::from_str(json).unwrap();
        let list = response.into_result("crm.item.list").unwrap().unwrap();
        assert_eq!(list.items.len(), 1);
    }

    #[test]
    fn test_null_result_is_empty() {
        let response: ApiResponse<ItemList> = serde_json::from_str(r#"{"result": null}"#).unwrap();
        assert!(response.into_result("crm.item.list").unwrap().is_none());
    }

    #[test]
    fn test_missing_result_key() {
        let response: ApiResponse<serde_json::Value> =
            serde_json::from_str(r#"{"time": {"start": 1}}"#).unwrap();
        assert!(response.into_result("crm.item.add").unwrap().is_none());
    }

    #[test]
    fn test_flat_error() {
        let json = r#"{"error": "ACCESS_DENIED", "error_description": "No rights"}"#;
        let response: ApiResponse<ItemList> = serde_json::from_str(json).unwrap();
        let err = response.into_result("crm.item.list").unwrap_err();
        match err {
            SyncError::RemoteApi {
                code, description, ..
            } => {
                assert_eq!(code, "ACCESS_DENIED");
                assert_eq!(description, "No rights");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_nested_error() {
        let json = r#"{"error": {"error": "NOT_FOUND", "error_description": "Item missing"}}"#;
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.api_error(),
            Some(("NOT_FOUND".to_string(), "Item missing".to_string()))
        );
    }

    #[test]
    fn test_empty_error_code_is_not_an_error() {
        let json = r#"{"result": true, "error": ""}"#;
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(response.into_result("crm.item.add").is_ok());
    }
}
