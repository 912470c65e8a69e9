//! Best-effort progress stream from the engine to whoever is listening.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

pub const DEFAULT_PROGRESS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum ProgressEvent {
    /// A file was confirmed at the destination.
    #[serde(rename_all = "camelCase")]
    Copy {
        copied: usize,
        total: usize,
        file_name: String,
    },
    /// A source file was examined during comparison.
    #[serde(rename_all = "camelCase")]
    Compare {
        total: usize,
        current: usize,
        file_name: String,
    },
    CompareDone { missing: usize },
}

/// Sending side of the progress stream. Never blocks: when the listener is
/// behind or gone, events are dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(event) {
                trace!("Dropped progress event: {}", e);
            }
        }
    }
}
