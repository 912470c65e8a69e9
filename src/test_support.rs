//! In-memory shell used by the unit tests. Its copier writes real files so
//! the engine's destination polling runs against an actual directory.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{SyncError, SyncResult};
use crate::shell::{
    names_match, BrowserWindowRef, FileCopier, FileEntry, FolderHandle, ShellDirectory,
    WindowContents, WindowHandle,
};

#[derive(Debug, Clone)]
pub enum CopyFault {
    /// Nothing ever lands at the destination.
    Stall,
    /// Half of the bytes land and the copy never finishes.
    Truncate,
    /// The copy request itself is rejected.
    Reject(String),
    /// The file lands after the given delay.
    Delay(Duration),
}

struct FakeWindow {
    title: String,
    path: Option<PathBuf>,
    top_level_files: Vec<FileEntry>,
    folders: Vec<(String, Vec<FileEntry>)>,
    inaccessible: HashSet<String>,
}

#[derive(Default)]
struct FakeState {
    windows: Vec<(i64, FakeWindow)>,
    enumeration_fails: bool,
    faults: HashMap<String, CopyFault>,
    copy_requests: Vec<String>,
}

#[derive(Default)]
pub struct FakeShell {
    state: Mutex<FakeState>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_window(&self, handle: i64, title: &str, path: Option<PathBuf>) {
        self.state.lock().windows.push((
            handle,
            FakeWindow {
                title: title.to_string(),
                path,
                top_level_files: Vec::new(),
                folders: Vec::new(),
                inaccessible: HashSet::new(),
            },
        ));
    }

    pub fn add_device_window(&self, handle: i64, title: &str) {
        self.add_window(handle, title, None);
    }

    pub fn add_fs_window(&self, handle: i64, title: &str, path: PathBuf) {
        self.add_window(handle, title, Some(path));
    }

    pub fn add_folder(&self, handle: i64, name: &str, entries: Vec<FileEntry>) {
        let mut state = self.state.lock();
        if let Some((_, window)) = state.windows.iter_mut().find(|(h, _)| *h == handle) {
            window.folders.push((name.to_string(), entries));
        }
    }

    pub fn add_top_level_file(&self, handle: i64, entry: FileEntry) {
        let mut state = self.state.lock();
        if let Some((_, window)) = state.windows.iter_mut().find(|(h, _)| *h == handle) {
            window.top_level_files.push(entry);
        }
    }

    pub fn make_inaccessible(&self, handle: i64, name: &str) {
        let mut state = self.state.lock();
        if let Some((_, window)) = state.windows.iter_mut().find(|(h, _)| *h == handle) {
            window.inaccessible.insert(name.to_string());
        }
    }

    pub fn fail_enumeration(&self) {
        self.state.lock().enumeration_fails = true;
    }

    pub fn inject_fault(&self, file_name: &str, fault: CopyFault) {
        self.state.lock().faults.insert(file_name.to_string(), fault);
    }

    /// Names passed to `start_copy`, in request order.
    pub fn copy_requests(&self) -> Vec<String> {
        self.state.lock().copy_requests.clone()
    }
}

impl ShellDirectory for FakeShell {
    fn windows(&self) -> SyncResult<Vec<BrowserWindowRef>> {
        let state = self.state.lock();
        if state.enumeration_fails {
            return Err(SyncError::ShellQuery("enumeration unavailable".into()));
        }
        Ok(state
            .windows
            .iter()
            .map(|(handle, window)| BrowserWindowRef {
                handle: WindowHandle(*handle),
                title: window.title.clone(),
                path: window.path.clone(),
            })
            .collect())
    }

    fn window_contents(&self, window: WindowHandle) -> SyncResult<WindowContents> {
        let state = self.state.lock();
        let (_, found) = state
            .windows
            .iter()
            .find(|(h, _)| *h == window.0)
            .ok_or_else(|| SyncError::WindowNotFound(window.to_string()))?;

        let mut entries: Vec<FileEntry> = found
            .folders
            .iter()
            .map(|(name, _)| FileEntry::folder(name.clone()))
            .collect();
        entries.extend(found.top_level_files.iter().cloned());

        Ok(WindowContents {
            display_name: found.title.clone(),
            path: found.path.clone(),
            entries,
        })
    }

    fn open_folder(&self, window: WindowHandle, name: &str) -> SyncResult<FolderHandle> {
        let state = self.state.lock();
        let (_, found) = state
            .windows
            .iter()
            .find(|(h, _)| *h == window.0)
            .ok_or_else(|| SyncError::WindowNotFound(window.to_string()))?;
        if found.inaccessible.contains(name) {
            return Err(SyncError::FolderInaccessible(name.to_string()));
        }
        Ok(FolderHandle {
            window,
            name: name.to_string(),
            path: found.path.as_ref().map(|p| p.join(name)),
        })
    }

    fn folder_entries(&self, folder: &FolderHandle) -> SyncResult<Vec<FileEntry>> {
        let state = self.state.lock();
        let (_, found) = state
            .windows
            .iter()
            .find(|(h, _)| *h == folder.window.0)
            .ok_or_else(|| SyncError::WindowNotFound(folder.window.to_string()))?;
        found
            .folders
            .iter()
            .find(|(name, _)| names_match(name, &folder.name))
            .map(|(_, entries)| entries.clone())
            .ok_or_else(|| SyncError::FolderNotFound(folder.name.clone()))
    }
}

fn write_bytes(path: &Path, len: u64) -> SyncResult<()> {
    std::fs::write(path, vec![0u8; len as usize])?;
    Ok(())
}

impl FileCopier for FakeShell {
    fn start_copy(
        &self,
        _source: &FolderHandle,
        entry: &FileEntry,
        target_dir: &Path,
    ) -> SyncResult<()> {
        let fault = {
            let mut state = self.state.lock();
            state.copy_requests.push(entry.name.clone());
            state.faults.get(&entry.name).cloned()
        };
        let target = target_dir.join(&entry.name);
        let full_len = entry.size.max(1);

        match fault {
            None => write_bytes(&target, full_len),
            Some(CopyFault::Stall) => Ok(()),
            Some(CopyFault::Truncate) => write_bytes(&target, entry.size / 2),
            Some(CopyFault::Reject(reason)) => Err(SyncError::CopyFailed(reason)),
            Some(CopyFault::Delay(delay)) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    let _ = write_bytes(&target, full_len);
                });
                Ok(())
            }
        }
    }
}
