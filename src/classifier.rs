//! Media classification by file extension.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::directory::FolderDirectory;
use crate::errors::SyncResult;
use crate::shell::{FileEntry, WindowHandle};

/// Extensions counted as photo/video media. Anything else is "other".
pub const KNOWN_MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "gif", "bmp", "tiff", "webp", "mov", "mp4", "m4v", "avi", "mts",
    "m2ts", "3gp", "mkv", "aae",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaCount {
    pub by_extension: BTreeMap<String, usize>,
    pub other_count: usize,
}

impl MediaCount {
    /// Files that had a detectable extension.
    pub fn total(&self) -> usize {
        self.by_extension.values().sum::<usize>() + self.other_count
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationReport {
    pub folder_name: String,
    pub path: Option<PathBuf>,
    pub total: usize,
    pub media: BTreeMap<String, usize>,
    pub other: usize,
}

/// Lowercased text after the last `.`, or `None` when the name has no dot
/// or ends with one.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, suffix) = name.trim().rsplit_once('.')?;
    let ext = suffix.trim().to_lowercase();
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

pub fn is_known_media(ext: &str) -> bool {
    KNOWN_MEDIA_EXTENSIONS.contains(&ext)
}

/// Counts non-folder entries by extension. Files without an extension are
/// left out of every bucket.
pub fn classify(entries: &[FileEntry]) -> MediaCount {
    let mut count = MediaCount::default();
    for entry in entries.iter().filter(|e| e.is_eligible_file()) {
        let Some(ext) = extension_of(&entry.name) else {
            continue;
        };
        if is_known_media(&ext) {
            *count.by_extension.entry(ext).or_insert(0) += 1;
        } else {
            count.other_count += 1;
        }
    }
    count
}

/// Classifies whatever the window currently shows (top level only).
pub fn classify_window(
    directory: &FolderDirectory,
    window: WindowHandle,
) -> SyncResult<ClassificationReport> {
    let contents = directory.window_contents(window)?;
    let count = classify(&contents.entries);
    Ok(ClassificationReport {
        folder_name: contents.display_name,
        path: contents.path,
        total: count.total(),
        media: count.by_extension,
        other: count.other_count,
    })
}

/// Classifies the direct children of a top-level folder of a window.
pub fn classify_folder(
    directory: &FolderDirectory,
    window: WindowHandle,
    folder_name: &str,
) -> SyncResult<ClassificationReport> {
    let folder = directory.resolve_folder(window, folder_name)?;
    let entries = directory.folder_entries(&folder)?;
    let count = classify(&entries);
    Ok(ClassificationReport {
        folder_name: folder.name,
        path: folder.path,
        total: count.total(),
        media: count.by_extension,
        other: count.other_count,
    })
}
