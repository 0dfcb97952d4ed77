//! Run cancellation and deadline handling.
//!
//! A sync run is cooperative: the engine checks the token once per record.
//! The token trips either when `cancel()` is called on any clone or when the
//! optional run deadline passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cancellation token shared between a run and whoever may stop it.
///
/// # Example
///
/// ```
/// use socio_sync_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
///
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Create a token with no deadline.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Create a token that also trips once `timeout` has elapsed from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Derive a token sharing this token's cancel flag, bounded by `timeout`.
    ///
    /// The earlier of the two deadlines wins.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let child_deadline = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, child_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            cancelled: self.cancelled.clone(),
            deadline,
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel()` was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the run deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    /// Time left until the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Return an error if the run should stop.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError::Requested)
        } else if self.is_expired() {
            Err(CancelledError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

/// Why a run was stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelledError {
    Requested,
    DeadlineExceeded,
}

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelledError::Requested => write!(f, "cancellation requested"),
            CancelledError::DeadlineExceeded => write!(f, "run deadline exceeded"),
        }
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for crate::error::SyncError {
    fn from(err: CancelledError) -> Self {
        crate::error::SyncError::Cancelled {
            reason: err.to_string(),
        }
    }
}
