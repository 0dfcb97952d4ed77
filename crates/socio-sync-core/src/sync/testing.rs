//! In-process [`RemoteDirectory`] used by the engine and service tests.

use crate::cancel::CancellationToken;
use crate::error::{Result, SyncError};
use crate::models::{RemoteRecord, SourceRecord};
use crate::remote::RemoteDirectory;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    records: Vec<RemoteRecord>,
    created: Vec<String>,
    updated: Vec<(i64, String)>,
    calls: usize,
    next_id: i64,
}

#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<State>,
    persist: bool,
    fail_connection: bool,
    fail_list: bool,
    fail_create: Option<String>,
    fail_update: Option<String>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeDirectory {
    pub fn new(records: Vec<RemoteRecord>) -> Self {
        let next_id = records.iter().filter_map(|r| r.remote_id).max().unwrap_or(0) + 1;
        Self {
            state: Mutex::new(State {
                records,
                next_id,
                ..State::default()
            }),
            ..Self::default()
        }
    }

    /// Keep created and updated items so a later `list_all` sees them.
    pub fn persist_creates(mut self) -> Self {
        self.persist = true;
        self
    }

    pub fn fail_connection(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    pub fn fail_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn fail_create_for(mut self, national_id: &str) -> Self {
        self.fail_create = Some(national_id.to_string());
        self
    }

    pub fn fail_update_for(mut self, national_id: &str) -> Self {
        self.fail_update = Some(national_id.to_string());
        self
    }

    /// Cancel `token` once `count` creates have succeeded.
    pub fn cancel_after_creates(mut self, count: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((count, token));
        self
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn updated(&self) -> Vec<(i64, String)> {
        self.state.lock().unwrap().updated.clone()
    }

    /// Number of create/update calls made.
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    fn rejected(operation: &str) -> SyncError {
        SyncError::HttpStatus {
            operation: operation.to_string(),
            status: 500,
            body: "rejected".to_string(),
        }
    }
}

#[async_trait]
impl RemoteDirectory for FakeDirectory {
    async fn test_connection(&self) -> Result<()> {
        if self.fail_connection {
            return Err(SyncError::Connectivity {
                target: "CRM".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<RemoteRecord>> {
        if self.fail_list {
            return Err(SyncError::RemoteApi {
                operation: "crm.item.list".to_string(),
                code: "ACCESS_DENIED".to_string(),
                description: "no rights".to_string(),
            });
        }
        Ok(self.state.lock().unwrap().records.clone())
    }

    async fn create(&self, source: &SourceRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if self.fail_create.as_deref() == Some(source.national_id.as_str()) {
            return Err(Self::rejected("crm.item.add"));
        }

        state.created.push(source.national_id.clone());
        if self.persist {
            let id = state.next_id;
            state.next_id += 1;
            state.records.push(RemoteRecord {
                remote_id: Some(id),
                ..source.to_remote()
            });
        }

        if let Some((count, token)) = &self.cancel_after {
            if state.created.len() >= *count {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn update(&self, remote_id: i64, source: &SourceRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if self.fail_update.as_deref() == Some(source.national_id.as_str()) {
            return Err(Self::rejected("crm.item.update"));
        }

        state.updated.push((remote_id, source.national_id.clone()));
        if self.persist {
            if let Some(record) = state
                .records
                .iter_mut()
                .find(|r| r.remote_id == Some(remote_id))
            {
                *record = RemoteRecord {
                    remote_id: Some(remote_id),
                    ..source.to_remote()
                };
            }
        }
        Ok(())
    }
}
