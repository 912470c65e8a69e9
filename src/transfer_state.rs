//! Bookkeeping for running transfers and the per-destination locks that keep
//! two runs from writing into the same folder at once.
//!
//! Nothing here is persisted; a transfer disappears from the registry when
//! its run ends.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Copy,
    CompareAndCopy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Waiting for another run on the same destination to finish.
    Pending,
    Comparing,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferState {
    pub id: String,
    pub kind: TransferKind,
    pub source_folder: String,
    pub destination: PathBuf,
    pub status: TransferStatus,
    pub files_total: usize,
    pub files_completed: usize,
    pub files_failed: usize,
    pub current_file: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl TransferState {
    pub fn new(kind: TransferKind, source_folder: &str, destination: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            source_folder: source_folder.to_string(),
            destination,
            status: TransferStatus::Pending,
            files_total: 0,
            files_completed: 0,
            files_failed: 0,
            current_file: None,
            started_at: now,
            updated_at: now,
            error: None,
        }
    }

    pub fn set_status(&mut self, status: TransferStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn start_file(&mut self, name: &str) {
        self.current_file = Some(name.to_string());
        self.updated_at = Utc::now();
    }

    pub fn complete_file(&mut self) {
        self.files_completed += 1;
        self.current_file = None;
        self.updated_at = Utc::now();
    }

    pub fn fail_file(&mut self, error: String) {
        self.files_failed += 1;
        self.current_file = None;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, TransferStatus::Completed | TransferStatus::Failed)
    }

    pub fn progress_percent(&self) -> f64 {
        if self.files_total == 0 {
            return 100.0;
        }
        (self.files_completed + self.files_failed) as f64 / self.files_total as f64 * 100.0
    }
}

type DestinationLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
pub struct TransferRegistry {
    states: RwLock<HashMap<String, Arc<RwLock<TransferState>>>>,
    locks: Mutex<HashMap<String, DestinationLock>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run. The returned guard unregisters it when dropped.
    pub fn begin(
        self: &Arc<Self>,
        kind: TransferKind,
        source_folder: &str,
        destination: PathBuf,
    ) -> TransferGuard {
        let state = TransferState::new(kind, source_folder, destination);
        let id = state.id.clone();
        let state = Arc::new(RwLock::new(state));
        self.states.write().insert(id.clone(), state.clone());
        TransferGuard {
            id,
            state,
            registry: self.clone(),
        }
    }

    pub fn active_transfers(&self) -> Vec<TransferState> {
        let states = self.states.read();
        states
            .values()
            .filter_map(|state| {
                let s = state.read();
                if !s.is_finished() {
                    Some(s.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    fn remove_transfer(&self, transfer_id: &str) {
        self.states.write().remove(transfer_id);
    }

    /// Lock shared by every run that writes into `destination`. Paths are
    /// compared case-insensitively, like the host filesystem does.
    pub fn destination_lock(&self, destination: &Path) -> DestinationLock {
        let key = destination.to_string_lossy().to_lowercase();
        let mut locks = self.locks.lock();
        locks.retain(|k, lock| *k == key || Arc::strong_count(lock) > 1);
        locks.entry(key).or_default().clone()
    }
}

/// Live handle on a registered run.
pub struct TransferGuard {
    id: String,
    state: Arc<RwLock<TransferState>>,
    registry: Arc<TransferRegistry>,
}

impl TransferGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn update<F: FnOnce(&mut TransferState)>(&self, f: F) {
        f(&mut *self.state.write());
    }

    pub fn snapshot(&self) -> TransferState {
        self.state.read().clone()
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.registry.remove_transfer(&self.id);
    }
}
