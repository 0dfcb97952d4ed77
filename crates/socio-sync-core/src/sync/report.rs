//! Outcome of one synchronization run.

use crate::error::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters, timing and errors of a run.
///
/// `success` only says whether the run reached its natural end. Per-record
/// failures leave it `true` and show up in `errors`, so callers check both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub client_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Human-readable run duration, e.g. `"1.52s"`.
    pub duration: String,
    pub duration_ms: u64,
    pub processed_count: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<String>,
    pub success: bool,
}

impl RunReport {
    /// Open a report stamped with the current time.
    pub fn start(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            start_time: Utc::now(),
            end_time: None,
            duration: String::new(),
            duration_ms: 0,
            processed_count: 0,
            created_count: 0,
            updated_count: 0,
            skipped_count: 0,
            errors: Vec::new(),
            success: false,
        }
    }

    pub fn record_created(&mut self) {
        self.created_count = self.created_count.saturating_add(1);
    }

    pub fn record_updated(&mut self) {
        self.updated_count = self.updated_count.saturating_add(1);
    }

    pub fn record_skipped(&mut self) {
        self.skipped_count = self.skipped_count.saturating_add(1);
    }

    /// Append a per-record failure; the run keeps going.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Close a run that reached its natural end.
    pub fn finish(mut self) -> Self {
        self.success = true;
        self.stamp_end();
        self
    }

    /// Close a run stopped by a fatal error.
    pub fn fail(mut self, context: &str, err: &SyncError) -> Self {
        self.success = false;
        self.errors.push(format!("{}: {}", context, err));
        self.stamp_end();
        self
    }

    fn stamp_end(&mut self) {
        let end = Utc::now();
        let elapsed = end
            .signed_duration_since(self.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.end_time = Some(end);
        self.duration = format!("{:.2?}", elapsed);
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    }
}
