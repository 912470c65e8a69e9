//! Data model shared with the host shell and the two capabilities the
//! engines consume: folder browsing and file copying.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::SyncResult;

/// Opaque identity of a browser window (an HWND on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(pub i64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open file-browser window.
///
/// `path` is `None` when the window shows a non-filesystem namespace, e.g. a
/// phone mounted over MTP. The reference goes stale as soon as the window is
/// closed or navigates elsewhere; callers re-resolve on every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserWindowRef {
    pub handle: WindowHandle,
    pub title: String,
    pub path: Option<PathBuf>,
}

/// One item of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub is_folder: bool,
    /// Size in bytes, 0 when the shell does not know it.
    pub size: u64,
}

impl FileEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_folder: false,
            size,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_folder: true,
            size: 0,
        }
    }

    /// Non-folder entry with a usable name.
    pub fn is_eligible_file(&self) -> bool {
        !self.is_folder && !self.name.is_empty()
    }
}

/// What a window currently shows: its own folder plus the direct children.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowContents {
    pub display_name: String,
    pub path: Option<PathBuf>,
    pub entries: Vec<FileEntry>,
}

/// A top-level folder of a window, resolved from the window's live listing.
///
/// Handles are not cached between operations; they carry enough to ask the
/// shell for the folder again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderHandle {
    pub window: WindowHandle,
    /// Name exactly as the shell lists it.
    pub name: String,
    pub path: Option<PathBuf>,
}

/// Host shell browsing capability.
pub trait ShellDirectory: Send + Sync {
    /// Every open browser window.
    fn windows(&self) -> SyncResult<Vec<BrowserWindowRef>>;

    /// Current listing of a window. Fails with `WindowNotFound` once the
    /// handle no longer resolves.
    fn window_contents(&self, window: WindowHandle) -> SyncResult<WindowContents>;

    /// Opens the listed child folder `name` of a window. Fails with
    /// `FolderInaccessible` when the shell cannot open it.
    fn open_folder(&self, window: WindowHandle, name: &str) -> SyncResult<FolderHandle>;

    /// Direct children of an opened folder.
    fn folder_entries(&self, folder: &FolderHandle) -> SyncResult<Vec<FileEntry>>;
}

/// Host shell copy capability.
///
/// `start_copy` may return before the bytes have landed; completion is
/// observed by the engine through the destination filesystem.
pub trait FileCopier: Send + Sync {
    fn start_copy(
        &self,
        source: &FolderHandle,
        entry: &FileEntry,
        target_dir: &Path,
    ) -> SyncResult<()>;
}

/// Case-insensitive, trimmed name comparison used for folder lookups.
pub fn names_match(listed: &str, requested: &str) -> bool {
    listed.trim().to_lowercase() == requested.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_trims_and_folds() {
        assert!(names_match("  DCIM ", "dcim"));
        assert!(names_match("Camera", "CAMERA "));
        assert!(!names_match("Camera", "Camera Roll"));
    }

    #[test]
    fn test_eligible_file() {
        assert!(FileEntry::file("a.jpg", 1).is_eligible_file());
        assert!(!FileEntry::folder("DCIM").is_eligible_file());
        assert!(!FileEntry::file("", 0).is_eligible_file());
    }

    #[test]
    fn test_window_ref_serialization() {
        let window = BrowserWindowRef {
            handle: WindowHandle(4242),
            title: "Apple iPhone".into(),
            path: None,
        };
        let value = serde_json::to_value(&window).unwrap();
        assert_eq!(value["handle"], 4242);
        assert!(value["path"].is_null());
    }
}
