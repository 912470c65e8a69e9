//! Destination-side filesystem operations.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use walkdir::WalkDir;

use crate::errors::{SyncError, SyncResult};
use crate::shell::FileEntry;

pub const COPY_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Creates `path` (and parents) unless it already exists.
pub fn ensure_directory(path: &Path) -> SyncResult<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)
        .map_err(|e| SyncError::CannotCreateDestination(format!("{}: {}", path.display(), e)))
}

/// Current size of a regular file, `None` if it is not there (yet).
pub fn probe_size(path: &Path) -> Option<u64> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Direct children of `dir`, sorted by name. A missing directory lists as empty.
pub fn list_entries(dir: &Path) -> SyncResult<Vec<FileEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    if !dir.is_dir() {
        return Err(SyncError::FolderInaccessible(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| SyncError::FolderInaccessible(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type().is_dir() {
            entries.push(FileEntry::folder(name));
        } else {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            entries.push(FileEntry::file(name, size));
        }
    }
    Ok(entries)
}

/// Whether `a` and `b` resolve to the same existing filesystem object.
pub fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Names of the non-folder children of `dir`.
pub fn list_file_names(dir: &Path) -> SyncResult<Vec<String>> {
    Ok(list_entries(dir)?
        .into_iter()
        .filter(|e| e.is_eligible_file())
        .map(|e| e.name)
        .collect())
}

/// Copy buffer for a file of `len` bytes: at least 1, at most
/// `COPY_BUFFER_SIZE`, without truncating lengths beyond `usize`.
fn buffer_size_for(len: u64) -> usize {
    let len = usize::try_from(len.max(1)).unwrap_or(usize::MAX);
    COPY_BUFFER_SIZE.min(len)
}

/// Blocking buffered copy that flushes to disk and keeps the source
/// modification time. Returns the number of bytes written.
pub fn copy_file(source: &Path, dest: &Path) -> SyncResult<u64> {
    let src_file = File::open(source)?;
    let src_metadata = src_file.metadata()?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut dest_file = File::create(dest)?;
    let buffer_size = buffer_size_for(src_metadata.len());
    let mut reader = BufReader::with_capacity(buffer_size, src_file);
    let mut writer = BufWriter::with_capacity(buffer_size, &mut dest_file);

    let mut buffer = vec![0u8; buffer_size];
    let mut bytes_copied: u64 = 0;
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        bytes_copied += bytes_read as u64;
    }

    writer.flush()?;
    drop(writer);
    dest_file.sync_all()?;

    let _ = filetime::set_file_mtime(
        dest,
        filetime::FileTime::from_system_time(src_metadata.modified()?),
    );

    Ok(bytes_copied)
}
