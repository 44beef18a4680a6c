//! Per-item save results

use super::error::SaveError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier returned when a blob is submitted
///
/// Unique and increasing for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl OperationId {
    pub(crate) fn next() -> Self {
        OperationId(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final result for one submitted blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub id: OperationId,
    pub result: Result<(), SaveError>,
}

impl SaveOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    /// Numeric error code, 0 on success
    pub fn error_code(&self) -> i32 {
        match &self.result {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }

    pub fn error(&self) -> Option<SaveError> {
        self.result.err()
    }
}

/// Receiving end for save outcomes
pub type OutcomeReceiver = mpsc::UnboundedReceiver<SaveOutcome>;

/// Sending end shared by commit tasks
#[derive(Debug, Clone)]
pub(crate) struct OutcomeSink {
    tx: mpsc::UnboundedSender<SaveOutcome>,
}

impl OutcomeSink {
    pub(crate) fn channel() -> (Self, OutcomeReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn report(&self, id: OperationId, result: Result<(), SaveError>) {
        if self.tx.send(SaveOutcome { id, result }).is_err() {
            debug!(%id, "Save outcome dropped, receiver closed");
        }
    }
}
