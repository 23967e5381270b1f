//! Configuration settings for FileWork
//!
//! Defines the worker tuning knobs, CLI arguments, and defaults for copy
//! and merge runs.

use crate::error::{FileWorkError, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of concurrent workers
pub const DEFAULT_CONCURRENT_WORKERS: usize = 6;

/// Default transfer buffer size (32 KiB)
pub const DEFAULT_TRANSFER_BUFFER_SIZE: usize = 32 * 1024;

/// Worker count used by the large-transfer preset
pub const LARGE_TRANSFER_WORKERS: usize = 2;

/// Buffer size used by the large-transfer preset (16 MiB)
pub const LARGE_TRANSFER_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// FileWork - incremental bulk copy and merge with a worker pool
#[derive(Parser, Debug, Clone)]
#[command(name = "filework")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Incremental bulk file copy and merge")]
#[command(long_about = r#"
FileWork copies or merges whole directory trees using a fixed pool of workers.

Copy runs are incremental: a file is only copied when the source is newer
than the destination, unless --replace-all is given. Merge runs concatenate
every source that maps to the same destination, in case-insensitive path order.

Examples:
  filework copy /source /destination             # Incremental copy
  filework copy /src /dst --replace-all -w 12    # Full copy, 12 workers
  filework merge /parts/a /parts/b /merged       # Merge two trees
  filework count /source                         # Count reachable files
"#)]
pub struct CliArgs {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Load worker settings from a JSON file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Show progress bars
    #[arg(short = 'p', long, global = true)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress the run summary)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Copy new or changed files from SOURCE into DESTINATION
    Copy {
        /// Source file or directory
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Destination file or directory
        #[arg(value_name = "DESTINATION")]
        destination: PathBuf,

        /// Copy every file, ignoring modification times
        #[arg(long)]
        replace_all: bool,

        /// Overlap directory scanning with copying
        #[arg(long)]
        streaming: bool,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Concatenate every SOURCE into DESTINATION
    Merge {
        /// Source files or directories, followed by the destination
        #[arg(value_name = "PATH", num_args = 2.., required = true)]
        paths: Vec<PathBuf>,

        /// Append to existing destination files instead of rebuilding them
        #[arg(long)]
        no_clean: bool,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Count files reachable below a directory
    Count {
        /// Directory to count
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
}

/// Worker tuning flags shared by copy and merge
#[derive(Args, Debug, Clone, Default)]
pub struct TuningArgs {
    /// Number of concurrent workers (0 = one per CPU)
    #[arg(short = 'w', long, env = "FILEWORK_WORKERS", value_name = "NUM")]
    pub workers: Option<usize>,

    /// Transfer buffer size (e.g., 32K, 16M)
    #[arg(short = 'b', long, env = "FILEWORK_BUFFER_SIZE", value_name = "SIZE")]
    pub buffer_size: Option<String>,

    /// Few large files: 2 workers with 16 MiB buffers
    #[arg(long)]
    pub large_transfer: bool,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON lines
    Json,
}

/// Runtime settings for copy and merge runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Copy every file regardless of timestamps
    pub replace_all: bool,
    /// Delete an existing merge destination before appending
    pub clean_output: bool,
    /// Number of workers (0 = one per CPU)
    pub concurrent_workers: usize,
    /// Transfer buffer size in bytes
    pub transfer_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            replace_all: false,
            clean_output: true,
            concurrent_workers: DEFAULT_CONCURRENT_WORKERS,
            transfer_buffer_size: DEFAULT_TRANSFER_BUFFER_SIZE,
        }
    }
}

impl WorkerConfig {
    /// Defaults with the large-transfer preset applied
    pub fn large_transfer() -> Self {
        let mut config = Self::default();
        config.apply_large_transfer_preset();
        config
    }

    /// Fewer workers and much larger buffers, for a handful of huge files
    pub fn apply_large_transfer_preset(&mut self) {
        self.concurrent_workers = LARGE_TRANSFER_WORKERS;
        self.transfer_buffer_size = LARGE_TRANSFER_BUFFER_SIZE;
    }

    /// Worker count with the auto-detect value resolved
    pub fn effective_workers(&self) -> usize {
        if self.concurrent_workers == 0 {
            num_cpus::get()
        } else {
            self.concurrent_workers
        }
    }

    /// Buffer size, never zero
    pub fn effective_buffer_size(&self) -> usize {
        self.transfer_buffer_size.max(1)
    }

    /// Load settings from a JSON file; missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FileWorkError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Overlay CLI tuning flags on top of this config
    pub fn apply_tuning(&mut self, tuning: &TuningArgs) -> Result<()> {
        if tuning.large_transfer {
            self.apply_large_transfer_preset();
        }
        if let Some(workers) = tuning.workers {
            self.concurrent_workers = workers;
        }
        if let Some(size) = &tuning.buffer_size {
            let bytes = parse_size(size)
                .map_err(|e| FileWorkError::config(format!("Invalid buffer size: {}", e)))?;
            self.transfer_buffer_size = usize::try_from(bytes)
                .map_err(|_| FileWorkError::config(format!("Buffer size too large: {}", size)))?;
        }
        Ok(())
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}
