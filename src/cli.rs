//! Command line definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mediabridge",
    version,
    about = "Copy photos and videos between two open file-browser windows"
)]
pub struct Cli {
    /// Treat these directories as the open windows (handles 1, 2, ...)
    /// instead of querying the desktop shell.
    #[arg(long = "root", value_name = "DIR", global = true)]
    pub roots: Vec<PathBuf>,

    /// Destination poll interval in milliseconds.
    #[arg(long, value_name = "MS", global = true)]
    pub poll_ms: Option<u64>,

    /// Per-file copy timeout in seconds.
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Settings file to use instead of the per-user default.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List open browser windows.
    Windows,
    /// List the top-level folders of a window.
    Folders { window: i64 },
    /// Count the files in a top-level folder of a window.
    Count { window: i64, folder: String },
    /// Count media files by extension in a window, or in one of its folders.
    Classify {
        window: i64,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Copy every file of a folder into the destination window.
    Copy {
        source: i64,
        folder: String,
        destination: i64,
    },
    /// Copy only the files of a folder the destination does not have yet.
    Compare {
        source: i64,
        folder: String,
        destination: i64,
    },
    /// Show or change the interface language.
    Language { code: Option<String> },
}
