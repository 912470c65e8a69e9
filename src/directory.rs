//! Window/folder directory: resolves windows and their top-level folders
//! against the live shell state on every call.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::{SyncError, SyncResult};
use crate::shell::{
    names_match, BrowserWindowRef, FileEntry, FolderHandle, ShellDirectory, WindowContents,
    WindowHandle,
};

/// Top-level folders of a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    pub window_display_name: String,
    pub window_path: Option<PathBuf>,
    pub folder_names: Vec<String>,
}

#[derive(Clone)]
pub struct FolderDirectory {
    shell: Arc<dyn ShellDirectory>,
}

impl FolderDirectory {
    pub fn new(shell: Arc<dyn ShellDirectory>) -> Self {
        Self { shell }
    }

    /// Open browser windows. Enumeration is best-effort: failures are logged
    /// and reported as an empty list.
    pub fn list_windows(&self) -> Vec<BrowserWindowRef> {
        match self.shell.windows() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Browser window enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    pub fn window_contents(&self, window: WindowHandle) -> SyncResult<WindowContents> {
        self.shell.window_contents(window)
    }

    pub fn resolve_folders(&self, window: WindowHandle) -> SyncResult<FolderSummary> {
        let contents = self.shell.window_contents(window)?;
        let folder_names = contents
            .entries
            .iter()
            .filter(|entry| entry.is_folder)
            .map(|entry| entry.name.clone())
            .collect();

        Ok(FolderSummary {
            window_display_name: contents.display_name,
            window_path: contents.path,
            folder_names,
        })
    }

    /// Finds the top-level folder `name` (trimmed, case-insensitive) in the
    /// window's current listing and opens it.
    pub fn resolve_folder(&self, window: WindowHandle, name: &str) -> SyncResult<FolderHandle> {
        let contents = self.shell.window_contents(window)?;
        let listed = contents
            .entries
            .iter()
            .find(|entry| entry.is_folder && names_match(&entry.name, name))
            .ok_or_else(|| SyncError::FolderNotFound(name.trim().to_string()))?;

        debug!(window = %window, folder = %listed.name, "Resolved folder");
        self.shell.open_folder(window, &listed.name)
    }

    pub fn folder_entries(&self, folder: &FolderHandle) -> SyncResult<Vec<FileEntry>> {
        self.shell.folder_entries(folder)
    }

    pub fn count_files_in_folder(&self, window: WindowHandle, name: &str) -> SyncResult<usize> {
        let folder = self.resolve_folder(window, name)?;
        let entries = self.shell.folder_entries(&folder)?;
        Ok(entries.iter().filter(|e| e.is_eligible_file()).count())
    }

    /// Filesystem path shown by a destination window.
    pub fn destination_root(&self, window: WindowHandle) -> SyncResult<PathBuf> {
        let contents = self.shell.window_contents(window)?;
        match contents.path {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(SyncError::DestinationNotFilesystem(contents.display_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeShell;

    fn directory(shell: &Arc<FakeShell>) -> FolderDirectory {
        FolderDirectory::new(shell.clone())
    }

    #[test]
    fn test_list_windows_degrades_to_empty() {
        let shell = Arc::new(FakeShell::new());
        shell.fail_enumeration();
        assert!(directory(&shell).list_windows().is_empty());
    }

    #[test]
    fn test_list_windows() {
        let shell = Arc::new(FakeShell::new());
        shell.add_device_window(1, "iPhone");
        shell.add_fs_window(2, "Pictures", PathBuf::from("/tmp/pictures"));
        let windows = directory(&shell).list_windows();
        assert_eq!(windows.len(), 2);
        assert!(windows[0].path.is_none());
        assert_eq!(windows[1].path, Some(PathBuf::from("/tmp/pictures")));
    }

    #[test]
    fn test_resolve_folders_lists_only_folders() {
        let shell = Arc::new(FakeShell::new());
        shell.add_device_window(1, "iPhone");
        shell.add_folder(1, "100APPLE", vec![FileEntry::file("IMG_0001.JPG", 10)]);
        shell.add_folder(1, "101APPLE", vec![]);
        shell.add_top_level_file(1, FileEntry::file("stray.txt", 3));

        let summary = directory(&shell).resolve_folders(WindowHandle(1)).unwrap();
        assert_eq!(summary.window_display_name, "iPhone");
        assert_eq!(summary.folder_names, vec!["100APPLE", "101APPLE"]);
    }

    #[test]
    fn test_resolve_missing_window() {
        let shell = Arc::new(FakeShell::new());
        let err = directory(&shell).resolve_folders(WindowHandle(9)).unwrap_err();
        assert!(matches!(err, SyncError::WindowNotFound(_)));
    }

    #[test]
    fn test_resolve_folder_is_case_insensitive_and_trimmed() {
        let shell = Arc::new(FakeShell::new());
        shell.add_device_window(1, "iPhone");
        shell.add_folder(1, "100APPLE", vec![]);

        let handle = directory(&shell)
            .resolve_folder(WindowHandle(1), "  100apple ")
            .unwrap();
        assert_eq!(handle.name, "100APPLE");
    }

    #[test]
    fn test_resolve_folder_twice_yields_same_folder() {
        let shell = Arc::new(FakeShell::new());
        shell.add_device_window(1, "iPhone");
        shell.add_folder(1, "100APPLE", vec![]);
        let dir = directory(&shell);

        let first = dir.resolve_folder(WindowHandle(1), "100APPLE").unwrap();
        let second = dir.resolve_folder(WindowHandle(1), "100APPLE").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_folder_not_found_and_inaccessible() {
        let shell = Arc::new(FakeShell::new());
        shell.add_device_window(1, "iPhone");
        shell.add_folder(1, "Locked", vec![]);
        shell.make_inaccessible(1, "Locked");
        let dir = directory(&shell);

        let err = dir.resolve_folder(WindowHandle(1), "Missing").unwrap_err();
        assert!(matches!(err, SyncError::FolderNotFound(_)));

        let err = dir.resolve_folder(WindowHandle(1), "locked").unwrap_err();
        assert!(matches!(err, SyncError::FolderInaccessible(_)));
    }

    #[test]
    fn test_count_files_skips_subfolders() {
        let shell = Arc::new(FakeShell::new());
        shell.add_device_window(1, "iPhone");
        shell.add_folder(
            1,
            "100APPLE",
            vec![
                FileEntry::file("a.jpg", 1),
                FileEntry::file("b.mov", 1),
                FileEntry::folder("nested"),
            ],
        );
        let count = directory(&shell)
            .count_files_in_folder(WindowHandle(1), "100APPLE")
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_destination_root_requires_filesystem_path() {
        let shell = Arc::new(FakeShell::new());
        shell.add_device_window(1, "iPhone");
        shell.add_fs_window(2, "Backup", PathBuf::from("/tmp/backup"));
        let dir = directory(&shell);

        let err = dir.destination_root(WindowHandle(1)).unwrap_err();
        assert!(matches!(err, SyncError::DestinationNotFilesystem(_)));
        assert_eq!(
            dir.destination_root(WindowHandle(2)).unwrap(),
            PathBuf::from("/tmp/backup")
        );
    }
}
