//! Host shell back-end: Windows File Explorer windows driven through
//! PowerShell and the `Shell.Application` COM object.
//!
//! Queries run in a fresh PowerShell process each. Copies go through one
//! long-lived session, because `Folder.CopyHere` returns immediately and the
//! transfer dies with the process that started it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

use crate::errors::{SyncError, SyncResult};
use crate::shell::{
    BrowserWindowRef, FileCopier, FileEntry, FolderHandle, ShellDirectory, WindowContents,
    WindowHandle,
};

const POWERSHELL: &str = "powershell";
const SESSION_DONE_MARKER: &str = "__MEDIABRIDGE_DONE__";

/// `CopyHere` option: answer "Yes to All" to any dialog.
const COPY_HERE_FLAGS: u32 = 16;

const PRELUDE: &str = "$ErrorActionPreference='SilentlyContinue'; \
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8; \
$shell = New-Object -ComObject Shell.Application;";

const FIND_WINDOW: &str = "$target = $null; \
foreach ($w in $shell.Windows()) { if ($w.HWND -eq $hwnd) { $target = $w; break } }; \
if ($null -eq $target) { [pscustomobject]@{ Ok=$false; Kind='window'; Error='Window not found' } | ConvertTo-Json -Compress; return };";

const FIND_CHILD_FOLDER: &str = "$item = $null; \
foreach ($i in $target.Document.Folder.Items()) { if ($i.IsFolder -and $i.Name -eq $name) { $item = $i; break } }; \
if ($null -eq $item) { [pscustomobject]@{ Ok=$false; Kind='folder'; Error='Folder not found' } | ConvertTo-Json -Compress; return }; \
$sub = $item.GetFolder; \
if ($null -eq $sub) { [pscustomobject]@{ Ok=$false; Kind='access'; Error='Cannot access folder' } | ConvertTo-Json -Compress; return };";

const LIST_ITEMS_FN: &str = "function List-Items($f) { $out = @(); foreach ($i in $f.Items()) { \
$size = 0; if (-not $i.IsFolder) { $size = $i.ExtendedProperty('System.Size'); if ($null -eq $size) { $size = 0 } }; \
$out += [pscustomobject]@{ Name=$i.Name; IsFolder=[bool]$i.IsFolder; Size=[int64]$size } }; return ,$out };";

/// Single-quoted PowerShell string literal.
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// ASCII-only PowerShell expression evaluating to `value`. The copy session
/// decodes its stdin with the console code page, so names and paths travel
/// as base64 UTF-8.
pub fn ps_utf8_literal(value: &str) -> String {
    format!(
        "([Text.Encoding]::UTF8.GetString([Convert]::FromBase64String('{}')))",
        BASE64.encode(value.as_bytes())
    )
}

fn wrap(body: &str) -> String {
    format!("& {{ {} {} }}", PRELUDE, body)
}

fn windows_script() -> String {
    wrap(
        "$out = @(); foreach ($w in $shell.Windows()) { try { \
$out += [pscustomobject]@{ Hwnd=[int64]$w.HWND; Title=$w.LocationName; Path=$w.Document.Folder.Self.Path } } catch { } }; \
ConvertTo-Json -InputObject $out -Compress -Depth 4",
    )
}

fn window_contents_script(window: WindowHandle) -> String {
    wrap(&format!(
        "$hwnd = {}; {} {} $folder = $target.Document.Folder; \
[pscustomobject]@{{ Ok=$true; Name=$folder.Self.Name; Path=$folder.Self.Path; Items=(List-Items $folder) }} | ConvertTo-Json -Compress -Depth 4",
        window.0, FIND_WINDOW, LIST_ITEMS_FN
    ))
}

fn open_folder_script(window: WindowHandle, name: &str) -> String {
    wrap(&format!(
        "$hwnd = {}; $name = {}; {} {} \
[pscustomobject]@{{ Ok=$true; Name=$item.Name; Path=$sub.Self.Path }} | ConvertTo-Json -Compress",
        window.0,
        ps_quote(name),
        FIND_WINDOW,
        FIND_CHILD_FOLDER
    ))
}

fn folder_entries_script(folder: &FolderHandle) -> String {
    wrap(&format!(
        "$hwnd = {}; $name = {}; {} {} {} \
[pscustomobject]@{{ Ok=$true; Items=(List-Items $sub) }} | ConvertTo-Json -Compress -Depth 4",
        folder.window.0,
        ps_quote(&folder.name),
        FIND_WINDOW,
        FIND_CHILD_FOLDER,
        LIST_ITEMS_FN
    ))
}

fn copy_script(folder: &FolderHandle, entry: &FileEntry, target_dir: &Path) -> String {
    wrap(&format!(
        "$hwnd = {}; $name = {}; $file = {}; $dst = {}; {} {} \
$src = $null; foreach ($i in $sub.Items()) {{ if (-not $i.IsFolder -and $i.Name -eq $file) {{ $src = $i; break }} }}; \
if ($null -eq $src) {{ [pscustomobject]@{{ Ok=$false; Kind='copy'; Error='File no longer listed' }} | ConvertTo-Json -Compress; return }}; \
$ns = $shell.NameSpace($dst); \
if ($null -eq $ns) {{ [pscustomobject]@{{ Ok=$false; Kind='copy'; Error='Failed to open destination namespace' }} | ConvertTo-Json -Compress; return }}; \
try {{ $ns.CopyHere($src, {}); [pscustomobject]@{{ Ok=$true }} | ConvertTo-Json -Compress }} \
catch {{ [pscustomobject]@{{ Ok=$false; Kind='copy'; Error=$_.Exception.Message }} | ConvertTo-Json -Compress }}",
        folder.window.0,
        ps_utf8_literal(&folder.name),
        ps_utf8_literal(&entry.name),
        ps_utf8_literal(&target_dir.to_string_lossy()),
        FIND_WINDOW,
        FIND_CHILD_FOLDER,
        COPY_HERE_FLAGS
    ))
}

/// Shell paths of virtual namespaces (phones, cameras) look like
/// `::{GUID}\...`; only real directories count as filesystem paths.
pub fn filesystem_path(raw: Option<&str>) -> Option<PathBuf> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.starts_with("::") {
        None
    } else {
        Some(PathBuf::from(raw))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawWindow {
    hwnd: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawItem {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_folder: bool,
    #[serde(default)]
    size: Option<i64>,
}

impl From<RawItem> for FileEntry {
    fn from(raw: RawItem) -> Self {
        FileEntry {
            name: raw.name.unwrap_or_default(),
            is_folder: raw.is_folder,
            size: raw.size.unwrap_or(0).max(0) as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawContents {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    items: Option<OneOrMany<RawItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawFolder {
    name: String,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawFailure {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Last JSON document printed by a script; anything else on stdout is noise.
fn json_payload(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{') || line.starts_with('['))
        .last()
}

/// Decodes a `{ Ok, Kind, Error, ... }` reply, mapping failures onto the
/// error taxonomy. `subject` names what the failure is about.
fn parse_reply<T: DeserializeOwned>(stdout: &str, subject: &str) -> SyncResult<T> {
    let payload = json_payload(stdout)
        .ok_or_else(|| SyncError::ShellQuery(format!("Empty output for {}", subject)))?;
    let value: serde_json::Value = serde_json::from_str(payload)?;

    if value.get("Ok").and_then(|ok| ok.as_bool()) == Some(false) {
        let failure: RawFailure = serde_json::from_value(value)?;
        let message = failure.error.unwrap_or_else(|| "unknown error".to_string());
        return Err(match failure.kind.as_deref() {
            Some("window") => SyncError::WindowNotFound(subject.to_string()),
            Some("folder") => SyncError::FolderNotFound(subject.to_string()),
            Some("access") => SyncError::FolderInaccessible(subject.to_string()),
            Some("copy") => SyncError::CopyFailed(message),
            _ => SyncError::ShellQuery(format!("{}: {}", subject, message)),
        });
    }
    Ok(serde_json::from_value(value)?)
}

fn parse_windows(stdout: &str) -> SyncResult<Vec<BrowserWindowRef>> {
    let Some(payload) = json_payload(stdout) else {
        return Ok(Vec::new());
    };
    let raw: OneOrMany<RawWindow> = serde_json::from_str(payload)?;
    Ok(raw
        .into_vec()
        .into_iter()
        .map(|w| BrowserWindowRef {
            handle: WindowHandle(w.hwnd),
            title: w.title.unwrap_or_default(),
            path: filesystem_path(w.path.as_deref()),
        })
        .collect())
}

fn run_script(script: &str) -> SyncResult<String> {
    let output = Command::new(POWERSHELL)
        .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-Command"])
        .arg(script)
        .output()
        .map_err(|e| SyncError::ShellQuery(format!("Failed to start PowerShell: {}", e)))?;

    if !output.status.success() {
        return Err(SyncError::ShellQuery(format!(
            "PowerShell exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// PowerShell process that reads one command per line from stdin.
struct CopySession {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl CopySession {
    fn spawn() -> SyncResult<Self> {
        let mut child = Command::new(POWERSHELL)
            .args([
                "-NoProfile",
                "-NoLogo",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SyncError::CopyFailed(format!("Failed to start PowerShell: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SyncError::Internal("PowerShell stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SyncError::Internal("PowerShell stdout unavailable".into()))?;
        debug!(pid = child.id(), "Started PowerShell copy session");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Runs one command and returns what it printed before the marker.
    fn run(&mut self, script: &str) -> SyncResult<String> {
        writeln!(self.stdin, "{}; Write-Output '{}'", script, SESSION_DONE_MARKER)?;
        self.stdin.flush()?;

        let mut collected = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(SyncError::CopyFailed(
                    "PowerShell session ended unexpectedly".into(),
                ));
            }
            if line.trim() == SESSION_DONE_MARKER {
                return Ok(collected);
            }
            collected.push_str(&line);
        }
    }
}

impl Drop for CopySession {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "exit");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

#[derive(Default)]
pub struct PowerShellShell {
    session: Mutex<Option<CopySession>>,
}

impl PowerShellShell {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShellDirectory for PowerShellShell {
    fn windows(&self) -> SyncResult<Vec<BrowserWindowRef>> {
        parse_windows(&run_script(&windows_script())?)
    }

    fn window_contents(&self, window: WindowHandle) -> SyncResult<WindowContents> {
        let stdout = run_script(&window_contents_script(window))?;
        let raw: RawContents = parse_reply(&stdout, &format!("window {}", window))?;
        Ok(WindowContents {
            display_name: raw.name.unwrap_or_default(),
            path: filesystem_path(raw.path.as_deref()),
            entries: raw
                .items
                .map(OneOrMany::into_vec)
                .unwrap_or_default()
                .into_iter()
                .map(FileEntry::from)
                .collect(),
        })
    }

    fn open_folder(&self, window: WindowHandle, name: &str) -> SyncResult<FolderHandle> {
        let stdout = run_script(&open_folder_script(window, name))?;
        let raw: RawFolder = parse_reply(&stdout, name)?;
        Ok(FolderHandle {
            window,
            name: raw.name,
            path: filesystem_path(raw.path.as_deref()),
        })
    }

    fn folder_entries(&self, folder: &FolderHandle) -> SyncResult<Vec<FileEntry>> {
        let stdout = run_script(&folder_entries_script(folder))?;
        let raw: RawContents = parse_reply(&stdout, &folder.name)?;
        Ok(raw
            .items
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(FileEntry::from)
            .collect())
    }
}

impl FileCopier for PowerShellShell {
    fn start_copy(
        &self,
        source: &FolderHandle,
        entry: &FileEntry,
        target_dir: &Path,
    ) -> SyncResult<()> {
        let script = copy_script(source, entry, target_dir);
        let mut guard = self.session.lock();
        if guard.is_none() {
            *guard = Some(CopySession::spawn()?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(SyncError::Internal("PowerShell session missing".into()));
        };

        match session.run(&script) {
            Ok(stdout) => parse_reply::<serde_json::Value>(&stdout, &entry.name).map(|_| ()),
            Err(e) => {
                warn!("PowerShell copy session failed, restarting on next copy: {}", e);
                *guard = None;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ps_quote_doubles_single_quotes() {
        assert_eq!(ps_quote("Mom's phone"), "'Mom''s phone'");
        assert_eq!(ps_quote("plain"), "'plain'");
    }

    #[test]
    fn test_filesystem_path_filters_virtual_namespaces() {
        assert_eq!(
            filesystem_path(Some("C:\\Users\\me\\Pictures")),
            Some(PathBuf::from("C:\\Users\\me\\Pictures"))
        );
        assert_eq!(
            filesystem_path(Some("::{20D04FE0-3AEA-1069-A2D8-08002B30309D}\\\\?\\usb#vid")),
            None
        );
        assert_eq!(filesystem_path(Some("  ")), None);
        assert_eq!(filesystem_path(None), None);
    }

    #[test]
    fn test_parse_windows_single_and_many() {
        let one = r#"{"Hwnd":1234,"Title":"Apple iPhone","Path":"::{GUID}"}"#;
        let windows = parse_windows(one).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].handle, WindowHandle(1234));
        assert!(windows[0].path.is_none());

        let many = r#"[{"Hwnd":1,"Title":"A","Path":"D:\\Backup"},{"Hwnd":2,"Title":"B","Path":null}]"#;
        let windows = parse_windows(many).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].path, Some(PathBuf::from("D:\\Backup")));
    }

    #[test]
    fn test_parse_windows_empty_output() {
        assert!(parse_windows("").unwrap().is_empty());
        assert!(parse_windows("\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_reply_maps_failure_kinds() {
        let reply = r#"{"Ok":false,"Kind":"window","Error":"Window not found"}"#;
        let err = parse_reply::<RawContents>(reply, "window 7").unwrap_err();
        assert!(matches!(err, SyncError::WindowNotFound(_)));

        let reply = r#"{"Ok":false,"Kind":"access","Error":"Cannot access folder"}"#;
        let err = parse_reply::<RawFolder>(reply, "DCIM").unwrap_err();
        assert!(matches!(err, SyncError::FolderInaccessible(_)));

        let reply = r#"{"Ok":false,"Kind":"copy","Error":"Access denied"}"#;
        let err = parse_reply::<serde_json::Value>(reply, "a.jpg").unwrap_err();
        assert!(matches!(err, SyncError::CopyFailed(ref m) if m == "Access denied"));
    }

    #[test]
    fn test_parse_contents_skips_noise_lines() {
        let stdout = "WARNING: something\r\n{\"Ok\":true,\"Name\":\"Internal Storage\",\"Path\":\"::{x}\",\"Items\":[{\"Name\":\"DCIM\",\"IsFolder\":true,\"Size\":0},{\"Name\":\"a.jpg\",\"IsFolder\":false,\"Size\":2048}]}\r\n";
        let raw: RawContents = parse_reply(stdout, "window 1").unwrap();
        let entries: Vec<FileEntry> = raw
            .items
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(FileEntry::from)
            .collect();
        assert_eq!(
            entries,
            vec![FileEntry::folder("DCIM"), FileEntry::file("a.jpg", 2048)]
        );
    }

    #[test]
    fn test_scripts_embed_quoted_arguments() {
        let script = open_folder_script(WindowHandle(55), "Kid's Photos");
        assert!(script.contains("$hwnd = 55;"));
        assert!(script.contains("$name = 'Kid''s Photos';"));
        assert!(script.starts_with("& {"));

        let folder = FolderHandle {
            window: WindowHandle(55),
            name: "Kid's Photos".into(),
            path: None,
        };
        let script = copy_script(
            &folder,
            &FileEntry::file("IMG_1.JPG", 10),
            Path::new("D:\\Backup\\Kid's Photos"),
        );
        assert!(script.contains("$hwnd = 55;"));
        assert!(script.contains(&format!("$name = {};", ps_utf8_literal("Kid's Photos"))));
        assert!(script.contains("CopyHere($src, 16)"));
        assert!(script.starts_with("& {"));
        assert!(!script.contains("exit"));
    }

    #[test]
    fn test_utf8_literal_round_trips() {
        let literal = ps_utf8_literal("Фото 2024");
        assert!(literal.is_ascii());
        let encoded = literal.split('\'').nth(1).unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), "Фото 2024".as_bytes());
    }

    #[test]
    fn test_copy_script_is_ascii_for_non_ascii_names() {
        let folder = FolderHandle {
            window: WindowHandle(9),
            name: "Камера".into(),
            path: None,
        };
        let script = copy_script(
            &folder,
            &FileEntry::file("снимок_01.jpg", 10),
            Path::new("C:\\Users\\Иван\\Pictures\\Камера"),
        );
        assert!(script.is_ascii());
        assert!(script.contains(&ps_utf8_literal("снимок_01.jpg")));
        assert!(script.contains(&ps_utf8_literal("C:\\Users\\Иван\\Pictures\\Камера")));
    }
}
