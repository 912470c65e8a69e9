//! Filesystem back-end: a fixed list of directories stands in for open
//! browser windows, and copies are plain blocking file copies.

use std::path::{Path, PathBuf};

use crate::errors::{SyncError, SyncResult};
use crate::file_ops;
use crate::shell::{
    BrowserWindowRef, FileCopier, FileEntry, FolderHandle, ShellDirectory, WindowContents,
    WindowHandle,
};

/// Handles are 1-based positions in `roots`.
pub struct LocalShell {
    roots: Vec<PathBuf>,
}

impl LocalShell {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn root(&self, window: WindowHandle) -> SyncResult<&Path> {
        let index = window
            .0
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| SyncError::WindowNotFound(window.to_string()))?;
        match self.roots.get(index) {
            Some(root) if root.is_dir() => Ok(root.as_path()),
            _ => Err(SyncError::WindowNotFound(window.to_string())),
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

impl ShellDirectory for LocalShell {
    fn windows(&self) -> SyncResult<Vec<BrowserWindowRef>> {
        Ok(self
            .roots
            .iter()
            .enumerate()
            .filter(|(_, root)| root.is_dir())
            .map(|(index, root)| BrowserWindowRef {
                handle: WindowHandle(index as i64 + 1),
                title: display_name(root),
                path: Some(root.clone()),
            })
            .collect())
    }

    fn window_contents(&self, window: WindowHandle) -> SyncResult<WindowContents> {
        let root = self.root(window)?;
        Ok(WindowContents {
            display_name: display_name(root),
            path: Some(root.to_path_buf()),
            entries: file_ops::list_entries(root)?,
        })
    }

    fn open_folder(&self, window: WindowHandle, name: &str) -> SyncResult<FolderHandle> {
        let path = self.root(window)?.join(name);
        if !path.is_dir() {
            return Err(SyncError::FolderNotFound(name.to_string()));
        }
        std::fs::read_dir(&path)
            .map_err(|e| SyncError::FolderInaccessible(format!("{}: {}", name, e)))?;
        Ok(FolderHandle {
            window,
            name: name.to_string(),
            path: Some(path),
        })
    }

    fn folder_entries(&self, folder: &FolderHandle) -> SyncResult<Vec<FileEntry>> {
        let path = folder
            .path
            .as_deref()
            .ok_or_else(|| SyncError::FolderInaccessible(folder.name.clone()))?;
        file_ops::list_entries(path)
    }
}

impl FileCopier for LocalShell {
    fn start_copy(
        &self,
        source: &FolderHandle,
        entry: &FileEntry,
        target_dir: &Path,
    ) -> SyncResult<()> {
        let source_dir = source.path.as_deref().ok_or_else(|| {
            SyncError::CopyFailed(format!("{} has no filesystem path", source.name))
        })?;
        let source_file = source_dir.join(&entry.name);
        let target_file = target_dir.join(&entry.name);
        if file_ops::same_location(&source_file, &target_file) {
            return Err(SyncError::CopyFailed(format!(
                "{} is both source and destination",
                target_file.display()
            )));
        }
        file_ops::copy_file(&source_file, &target_file)
            .map(|_| ())
            .map_err(|e| SyncError::CopyFailed(e.to_string()))
    }
}
