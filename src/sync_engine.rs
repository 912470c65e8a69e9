//! Serial copy engine and the compare-then-copy-missing mode built on it.
//!
//! Files are copied strictly one at a time. The shell copy primitive gives no
//! completion signal, so after each request the engine polls the destination
//! until the file has reached its expected size, or gives up after the
//! configured ceiling and records a per-file error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::diff::{find_missing, Inventory};
use crate::directory::FolderDirectory;
use crate::errors::{SyncError, SyncResult};
use crate::file_ops;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::shell::{FileCopier, FileEntry, FolderHandle, ShellDirectory, WindowHandle};
use crate::transfer_state::{
    TransferGuard, TransferKind, TransferRegistry, TransferState, TransferStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyResult {
    pub ok: bool,
    pub copied_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<String>,
    pub source_folder_name: String,
    pub destination_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffCopyResult {
    pub ok: bool,
    pub missing_count: usize,
    pub copied_count: usize,
    pub errors: Vec<String>,
    pub source_folder_name: String,
    pub destination_path: PathBuf,
}

/// Outcome of copying a list of files.
#[derive(Debug, Default)]
struct BatchOutcome {
    copied: usize,
    errors: Vec<String>,
}

/// Where a run reads from and writes to, resolved from live shell state.
struct RunTarget {
    source: FolderHandle,
    target_dir: PathBuf,
}

pub struct SyncEngine {
    directory: FolderDirectory,
    copier: Arc<dyn FileCopier>,
    config: EngineConfig,
    transfers: Arc<TransferRegistry>,
}

impl SyncEngine {
    pub fn new(
        shell: Arc<dyn ShellDirectory>,
        copier: Arc<dyn FileCopier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            directory: FolderDirectory::new(shell),
            copier,
            config,
            transfers: Arc::new(TransferRegistry::new()),
        }
    }

    pub fn directory(&self) -> &FolderDirectory {
        &self.directory
    }

    pub fn active_transfers(&self) -> Vec<TransferState> {
        self.transfers.active_transfers()
    }

    /// Copies every file of the top-level folder `folder_name` of the source
    /// window into `<destination window path>/<folder>`.
    ///
    /// Only setup problems (window, folder, destination) fail the call;
    /// per-file failures are listed in `errors` of an `ok` result.
    pub async fn copy_folder_serial(
        &self,
        source_window: WindowHandle,
        folder_name: &str,
        destination_window: WindowHandle,
        progress: &ProgressReporter,
    ) -> SyncResult<CopyResult> {
        let target = self
            .resolve_target(source_window, folder_name, destination_window)
            .await?;
        let transfer = self.transfers.begin(
            TransferKind::Copy,
            &target.source.name,
            target.target_dir.clone(),
        );
        let lock = self.transfers.destination_lock(&target.target_dir);
        let _held = lock.lock().await;

        let result = self.run_copy(&target, &transfer, progress).await;
        finish(&transfer, &result);
        result
    }

    async fn run_copy(
        &self,
        target: &RunTarget,
        transfer: &TransferGuard,
        progress: &ProgressReporter,
    ) -> SyncResult<CopyResult> {
        let source = target.source.clone();
        let target_dir = target.target_dir.clone();
        let entries: Vec<FileEntry> = self
            .blocking(move |directory| {
                file_ops::ensure_directory(&target_dir)?;
                Ok(directory
                    .folder_entries(&source)?
                    .into_iter()
                    .filter(|e| e.is_eligible_file())
                    .collect())
            })
            .await?;

        info!(
            folder = %target.source.name,
            destination = %target.target_dir.display(),
            files = entries.len(),
            "Starting serial copy"
        );

        let outcome = self
            .copy_entries(&target.source, &entries, &target.target_dir, transfer, progress)
            .await;

        info!(
            folder = %target.source.name,
            copied = outcome.copied,
            failed = outcome.errors.len(),
            "Serial copy finished"
        );

        Ok(CopyResult {
            ok: true,
            copied_count: outcome.copied,
            skipped_count: 0,
            errors: outcome.errors,
            source_folder_name: target.source.name.clone(),
            destination_path: target.target_dir.clone(),
        })
    }

    /// Copies only the files of the source folder whose names (ignoring case)
    /// are not already in the destination folder.
    pub async fn compare_and_copy_missing(
        &self,
        source_window: WindowHandle,
        folder_name: &str,
        destination_window: WindowHandle,
        progress: &ProgressReporter,
    ) -> SyncResult<DiffCopyResult> {
        let target = self
            .resolve_target(source_window, folder_name, destination_window)
            .await?;
        let transfer = self.transfers.begin(
            TransferKind::CompareAndCopy,
            &target.source.name,
            target.target_dir.clone(),
        );
        let lock = self.transfers.destination_lock(&target.target_dir);
        let _held = lock.lock().await;

        let result = self.run_compare(&target, &transfer, progress).await;
        finish(&transfer, &result);
        result
    }

    async fn run_compare(
        &self,
        target: &RunTarget,
        transfer: &TransferGuard,
        progress: &ProgressReporter,
    ) -> SyncResult<DiffCopyResult> {
        transfer.update(|s| s.set_status(TransferStatus::Comparing));

        let source = target.source.clone();
        let target_dir = target.target_dir.clone();
        let (source_entries, destination) = self
            .blocking(move |directory| {
                let entries = directory.folder_entries(&source)?;
                let names = file_ops::list_file_names(&target_dir)?;
                Ok((entries, Inventory::from_names(names)))
            })
            .await?;
        debug!(
            folder = %target.source.name,
            destination_files = destination.len(),
            "Comparing folder against destination"
        );

        let missing = find_missing(&source_entries, &destination, |current, total, entry| {
            progress.emit(ProgressEvent::Compare {
                total,
                current,
                file_name: entry.name.clone(),
            });
        });
        progress.emit(ProgressEvent::CompareDone {
            missing: missing.len(),
        });
        info!(
            folder = %target.source.name,
            missing = missing.len(),
            "Comparison finished"
        );

        let mut result = DiffCopyResult {
            ok: true,
            missing_count: missing.len(),
            copied_count: 0,
            errors: Vec::new(),
            source_folder_name: target.source.name.clone(),
            destination_path: target.target_dir.clone(),
        };
        if missing.is_empty() {
            return Ok(result);
        }

        let target_dir = target.target_dir.clone();
        self.blocking(move |_| file_ops::ensure_directory(&target_dir))
            .await?;
        let outcome = self
            .copy_entries(&target.source, &missing, &target.target_dir, transfer, progress)
            .await;
        result.copied_count = outcome.copied;
        result.errors = outcome.errors;
        Ok(result)
    }

    /// Fails before anything is copied when the target folder is the source
    /// folder itself.
    async fn resolve_target(
        &self,
        source_window: WindowHandle,
        folder_name: &str,
        destination_window: WindowHandle,
    ) -> SyncResult<RunTarget> {
        let folder_name = folder_name.to_string();
        self.blocking(move |directory| {
            let source = directory.resolve_folder(source_window, &folder_name)?;
            let destination_root = directory.destination_root(destination_window)?;
            let target_dir = destination_root.join(&source.name);
            if let Some(source_dir) = &source.path {
                if file_ops::same_location(source_dir, &target_dir) {
                    return Err(SyncError::SameSourceAndDestination(
                        target_dir.display().to_string(),
                    ));
                }
            }
            Ok(RunTarget { source, target_dir })
        })
        .await
    }

    /// Shell queries and directory listings block, so they run off the
    /// async workers.
    async fn blocking<T, F>(&self, f: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&FolderDirectory) -> SyncResult<T> + Send + 'static,
    {
        let directory = self.directory.clone();
        tokio::task::spawn_blocking(move || f(&directory))
            .await
            .map_err(|e| SyncError::Internal(e.to_string()))?
    }

    /// Copies `entries` in order, each one confirmed before the next starts.
    async fn copy_entries(
        &self,
        source: &FolderHandle,
        entries: &[FileEntry],
        target_dir: &Path,
        transfer: &TransferGuard,
        progress: &ProgressReporter,
    ) -> BatchOutcome {
        let total = entries.len();
        transfer.update(|s| {
            s.files_total = total;
            s.set_status(TransferStatus::Running);
        });

        let mut outcome = BatchOutcome::default();
        for entry in entries {
            transfer.update(|s| s.start_file(&entry.name));
            match self.copy_one(source, entry, target_dir).await {
                Ok(()) => {
                    outcome.copied += 1;
                    transfer.update(|s| s.complete_file());
                    debug!(file = %entry.name, copied = outcome.copied, "Copy confirmed");
                    progress.emit(ProgressEvent::Copy {
                        copied: outcome.copied,
                        total,
                        file_name: entry.name.clone(),
                    });
                }
                Err(e) => {
                    let message = per_file_message(&entry.name, e);
                    warn!("{}", message);
                    transfer.update(|s| s.fail_file(message.clone()));
                    outcome.errors.push(message);
                }
            }
        }
        outcome
    }

    async fn copy_one(
        &self,
        source: &FolderHandle,
        entry: &FileEntry,
        target_dir: &Path,
    ) -> SyncResult<()> {
        let copier = self.copier.clone();
        let source_folder = source.clone();
        let request = entry.clone();
        let dir = target_dir.to_path_buf();
        tokio::task::spawn_blocking(move || copier.start_copy(&source_folder, &request, &dir))
            .await
            .map_err(|e| SyncError::Internal(e.to_string()))??;

        self.wait_for_copy(&target_dir.join(&entry.name), entry.size)
            .await
    }

    /// Polls `target` until it holds at least `expected_size` bytes, or any
    /// bytes at all when the size is unknown (0).
    async fn wait_for_copy(&self, target: &Path, expected_size: u64) -> SyncResult<()> {
        let deadline = Instant::now() + self.config.copy_timeout;
        loop {
            if let Some(size) = file_ops::probe_size(target) {
                let landed = if expected_size > 0 {
                    size >= expected_size
                } else {
                    size > 0
                };
                if landed {
                    return Ok(());
                }
                trace!(path = %target.display(), size, expected_size, "Copy still in progress");
            }
            if Instant::now() >= deadline {
                return Err(SyncError::Timeout(target.display().to_string()));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

fn per_file_message(name: &str, err: SyncError) -> String {
    match err {
        SyncError::Timeout(_) => format!("Timeout waiting copy: {}", name),
        SyncError::CopyFailed(reason) => format!("Copy failed: {} - {}", name, reason),
        other => format!("Copy failed: {} - {}", name, other),
    }
}

fn finish<T>(transfer: &TransferGuard, result: &SyncResult<T>) {
    transfer.update(|s| match result {
        Ok(_) => s.set_status(TransferStatus::Completed),
        Err(e) => {
            s.error = Some(e.to_string());
            s.set_status(TransferStatus::Failed);
        }
    });

    let state = transfer.snapshot();
    debug!(
        id = transfer.id(),
        status = ?state.status,
        completed = state.files_completed,
        failed = state.files_failed,
        percent = state.progress_percent(),
        "Transfer finished"
    );
}
