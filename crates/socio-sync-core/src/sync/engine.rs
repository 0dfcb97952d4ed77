//! Reconciliation engine.
//!
//! Joins a ledger snapshot with a CRM snapshot by national ID, classifies
//! each ledger record as create, update or skip, and applies the actions one
//! record at a time. A failed create/update is recorded and the loop moves
//! on; only cancellation stops it early.

use super::report::RunReport;
use crate::cancel::CancellationToken;
use crate::error::{Result, SyncError};
use crate::models::{RemoteRecord, SourceRecord};
use crate::remote::RemoteDirectory;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, error, info, warn};

/// What the engine decided to do with one ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Create,
    /// `remote_id` is `None` when the CRM item came back without an id.
    Update { remote_id: Option<i64> },
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingKey,
    Unchanged,
}

/// CRM records keyed by national ID. The first record seen for a key wins.
#[derive(Debug, Default)]
pub struct RemoteIndex<'a> {
    by_key: HashMap<&'a str, &'a RemoteRecord>,
    duplicates: Vec<&'a str>,
}

impl<'a> RemoteIndex<'a> {
    pub fn build(records: &'a [RemoteRecord]) -> Self {
        let mut index = RemoteIndex {
            by_key: HashMap::with_capacity(records.len()),
            duplicates: Vec::new(),
        };

        for record in records {
            if record.national_id.is_empty() {
                continue;
            }
            if index.by_key.contains_key(record.national_id.as_str()) {
                warn!(
                    "Duplicate CRM item for DNI={} (id {:?}); keeping the first one",
                    record.national_id, record.remote_id
                );
                index.duplicates.push(record.national_id.as_str());
                continue;
            }
            index.by_key.insert(record.national_id.as_str(), record);
        }

        index
    }

    pub fn get(&self, national_id: &str) -> Option<&'a RemoteRecord> {
        self.by_key.get(national_id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Keys that appeared more than once, one entry per ignored duplicate.
    pub fn duplicates(&self) -> &[&'a str] {
        &self.duplicates
    }
}

/// Decide the action for one ledger record given its CRM match, if any.
pub fn classify(source: &SourceRecord, remote: Option<&RemoteRecord>) -> SyncAction {
    if !source.is_valid() {
        return SyncAction::Skip(SkipReason::MissingKey);
    }
    match remote {
        None => SyncAction::Create,
        Some(remote) if remote.needs_update(source) => SyncAction::Update {
            remote_id: remote.remote_id,
        },
        Some(_) => SyncAction::Skip(SkipReason::Unchanged),
    }
}

/// Classify a whole snapshot without touching the CRM.
pub fn plan(sources: &[SourceRecord], remotes: &[RemoteRecord]) -> Vec<SyncAction> {
    let index = RemoteIndex::build(remotes);
    sources
        .iter()
        .map(|source| classify(source, index.get(&source.national_id)))
        .collect()
}

/// Await `fut`, giving up when the run deadline passes.
pub(crate) async fn bounded<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    token.check()?;
    match token.remaining() {
        Some(remaining) => match tokio::time::timeout(remaining, fut).await {
            Ok(result) => result,
            Err(_) => Err(crate::cancel::CancelledError::DeadlineExceeded.into()),
        },
        None => fut.await,
    }
}

/// Apply the create/update/skip actions for `sources` against `remote`.
///
/// Counters on `report` are updated as records are processed. Returns an
/// error only on cancellation; counters then reflect the work done so far.
pub async fn reconcile<R>(
    remote: &R,
    sources: &[SourceRecord],
    remotes: &[RemoteRecord],
    token: &CancellationToken,
    report: &mut RunReport,
) -> Result<()>
where
    R: RemoteDirectory + ?Sized,
{
    let index = RemoteIndex::build(remotes);
    if !index.duplicates().is_empty() {
        warn!(
            "{} duplicate DNI(s) in CRM snapshot were ignored",
            index.duplicates().len()
        );
    }

    for source in sources {
        token.check()?;

        match classify(source, index.get(&source.national_id)) {
            SyncAction::Skip(SkipReason::MissingKey) => {
                warn!("Skipping socio with empty DNI");
                report.record_skipped();
            }
            SyncAction::Skip(SkipReason::Unchanged) => {
                debug!("Socio unchanged: DNI={}", source.national_id);
                report.record_skipped();
            }
            SyncAction::Create => {
                info!(
                    "Creating socio: DNI={}, Name={}",
                    source.national_id, source.legal_name
                );
                match bounded(token, remote.create(source)).await {
                    Ok(()) => report.record_created(),
                    Err(e) if e.is_cancellation() => return Err(e),
                    Err(e) => record_failure(report, "create", source, &e),
                }
            }
            SyncAction::Update { remote_id } => {
                info!(
                    "Updating socio: DNI={}, Name={}",
                    source.national_id, source.legal_name
                );
                let Some(remote_id) = remote_id else {
                    let cause = SyncError::Other("CRM item has no id".to_string());
                    record_failure(report, "update", source, &cause);
                    continue;
                };
                match bounded(token, remote.update(remote_id, source)).await {
                    Ok(()) => report.record_updated(),
                    Err(e) if e.is_cancellation() => return Err(e),
                    Err(e) => record_failure(report, "update", source, &e),
                }
            }
        }
    }

    Ok(())
}

fn record_failure(report: &mut RunReport, operation: &str, source: &SourceRecord, cause: &SyncError) {
    let err = SyncError::apply(operation, &source.national_id, cause);
    error!("{}", err);
    report.record_error(err.to_string());
}
