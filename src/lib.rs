//! Mediabridge backend library.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod diff;
pub mod directory;
pub mod errors;
pub mod file_ops;
pub mod local_shell;
pub mod logging;
pub mod powershell;
pub mod progress;
pub mod shell;
pub mod sync_engine;
pub mod transfer_state;

#[cfg(test)]
mod test_support;

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use classifier::ClassificationReport;
use cli::{Cli, Command};
use config::{AppConfig, EngineConfig};
use directory::FolderSummary;
use errors::{FailureResponse, SyncError, SyncResult};
use local_shell::LocalShell;
use powershell::PowerShellShell;
use progress::{ProgressEvent, ProgressReporter, DEFAULT_PROGRESS_CAPACITY};
use shell::{BrowserWindowRef, FileCopier, ShellDirectory, WindowHandle};
use sync_engine::{CopyResult, DiffCopyResult, SyncEngine};

#[derive(Debug, Clone, Serialize)]
pub struct FileCount {
    pub count: usize,
}

/// The operations a front end can invoke. Each call re-resolves windows and
/// folders from the live shell.
pub struct AppState {
    engine: SyncEngine,
    config_path: PathBuf,
}

impl AppState {
    pub fn new(
        shell: Arc<dyn ShellDirectory>,
        copier: Arc<dyn FileCopier>,
        engine_config: EngineConfig,
        config_path: PathBuf,
    ) -> Self {
        Self {
            engine: SyncEngine::new(shell, copier, engine_config),
            config_path,
        }
    }

    pub fn list_windows(&self) -> Vec<BrowserWindowRef> {
        self.engine.directory().list_windows()
    }

    pub fn resolve_folders(&self, window: WindowHandle) -> SyncResult<FolderSummary> {
        self.engine.directory().resolve_folders(window)
    }

    pub fn count_files_in_folder(
        &self,
        window: WindowHandle,
        folder_name: &str,
    ) -> SyncResult<FileCount> {
        let count = self
            .engine
            .directory()
            .count_files_in_folder(window, folder_name)?;
        Ok(FileCount { count })
    }

    pub fn classify_media(&self, window: WindowHandle) -> SyncResult<ClassificationReport> {
        classifier::classify_window(self.engine.directory(), window)
    }

    pub fn classify_folder(
        &self,
        window: WindowHandle,
        folder_name: &str,
    ) -> SyncResult<ClassificationReport> {
        classifier::classify_folder(self.engine.directory(), window, folder_name)
    }

    pub async fn copy_folder_serial(
        &self,
        source_window: WindowHandle,
        folder_name: &str,
        destination_window: WindowHandle,
        progress: &ProgressReporter,
    ) -> SyncResult<CopyResult> {
        self.engine
            .copy_folder_serial(source_window, folder_name, destination_window, progress)
            .await
    }

    pub async fn compare_and_copy_missing(
        &self,
        source_window: WindowHandle,
        folder_name: &str,
        destination_window: WindowHandle,
        progress: &ProgressReporter,
    ) -> SyncResult<DiffCopyResult> {
        self.engine
            .compare_and_copy_missing(source_window, folder_name, destination_window, progress)
            .await
    }

    pub fn load_config(&self) -> AppConfig {
        AppConfig::load_from(&self.config_path)
    }

    pub fn save_config(&self, config: &AppConfig) -> SyncResult<()> {
        config.save_to(&self.config_path)
    }
}

fn engine_config(cli: &Cli) -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(ms) = cli.poll_ms {
        config = config.with_poll_interval(Duration::from_millis(ms.max(1)));
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_copy_timeout(Duration::from_secs(secs));
    }
    config
}

fn build_state(cli: &Cli) -> SyncResult<AppState> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::default_path()?,
    };

    if cli.roots.is_empty() {
        debug!("Using the desktop shell back-end");
        let shell = Arc::new(PowerShellShell::new());
        Ok(AppState::new(shell.clone(), shell, engine_config(cli), config_path))
    } else {
        debug!(roots = cli.roots.len(), "Using the local directory back-end");
        let shell = Arc::new(LocalShell::new(cli.roots.clone()));
        Ok(AppState::new(shell.clone(), shell, engine_config(cli), config_path))
    }
}

fn print_json<T: Serialize>(value: &T) -> SyncResult<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Prints progress events as JSON lines while `run` executes.
async fn with_progress<T, F, Fut>(run: F) -> SyncResult<T>
where
    F: FnOnce(ProgressReporter) -> Fut,
    Fut: std::future::Future<Output = SyncResult<T>>,
{
    let (reporter, mut rx) = ProgressReporter::channel(DEFAULT_PROGRESS_CAPACITY);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let _ = print_json::<ProgressEvent>(&event);
        }
    });

    let result = run(reporter).await;
    printer
        .await
        .map_err(|e| SyncError::Internal(e.to_string()))?;
    result
}

async fn dispatch(state: &AppState, command: Command) -> SyncResult<()> {
    match command {
        Command::Windows => print_json(&state.list_windows()),
        Command::Folders { window } => print_json(&state.resolve_folders(WindowHandle(window))?),
        Command::Count { window, folder } => {
            print_json(&state.count_files_in_folder(WindowHandle(window), &folder)?)
        }
        Command::Classify { window, folder } => {
            let report = match folder {
                Some(folder) => state.classify_folder(WindowHandle(window), &folder)?,
                None => state.classify_media(WindowHandle(window))?,
            };
            print_json(&report)
        }
        Command::Copy {
            source,
            folder,
            destination,
        } => {
            let result = with_progress(|reporter| async move {
                state
                    .copy_folder_serial(
                        WindowHandle(source),
                        &folder,
                        WindowHandle(destination),
                        &reporter,
                    )
                    .await
            })
            .await?;
            print_json(&result)
        }
        Command::Compare {
            source,
            folder,
            destination,
        } => {
            let result = with_progress(|reporter| async move {
                state
                    .compare_and_copy_missing(
                        WindowHandle(source),
                        &folder,
                        WindowHandle(destination),
                        &reporter,
                    )
                    .await
            })
            .await?;
            print_json(&result)
        }
        Command::Language { code } => {
            let mut config = state.load_config();
            if let Some(code) = code {
                config.language = code;
                state.save_config(&config)?;
                info!(language = %config.language, "Saved language");
            }
            print_json(&config)
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let state = build_state(&cli)?;
    let outcome = runtime.block_on(dispatch(&state, cli.command));
    if let Err(e) = &outcome {
        if e.is_resolution() {
            warn!("Nothing copied: {}", e);
        } else {
            error!("Command failed: {}", e);
        }
        print_json(&FailureResponse::from(e))?;
    }
    outcome.map_err(anyhow::Error::from)
}
