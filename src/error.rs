//! Error types for FileWork
//!
//! Discovery errors (a missing source) are returned straight from the
//! enqueue call. Per-job errors are captured by the worker pool and
//! reported in the run summary instead of stopping sibling workers.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for FileWork operations
#[derive(Error, Debug)]
pub enum FileWorkError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Enqueued source is neither a directory nor a file-bearing pair
    #[error("Could not find directory or file '{0}'")]
    SourceNotFound(PathBuf),

    /// Merge job built without any source files
    #[error("Merge job for '{0}' has no sources")]
    EmptyMergeJob(PathBuf),

    /// Source and destination resolve to the same file
    #[error("Source and destination are the same file '{0}'")]
    SameFile(PathBuf),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Worker thread could not be started or joined
    #[error("Worker pool error: {0}")]
    WorkerPoolError(String),

    /// A job panicked inside a worker
    #[error("Worker panicked while processing '{path}': {message}")]
    WorkerPanic {
        /// Destination of the job that panicked
        path: PathBuf,
        /// Panic payload, when it was a string
        message: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Multiple errors occurred
    #[error("Multiple errors occurred ({count} errors)")]
    MultipleErrors {
        /// Number of errors collected
        count: usize,
        /// The errors, in the order they occurred
        errors: Vec<FileWorkError>,
    },
}

impl FileWorkError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Check if this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is a permission issue
    pub fn is_permission_error(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::SourceNotFound(path)
            | Self::EmptyMergeJob(path)
            | Self::SameFile(path)
            | Self::WorkerPanic { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for FileWork operations
pub type Result<T> = std::result::Result<T, FileWorkError>;

impl From<std::io::Error> for FileWorkError {
    fn from(err: std::io::Error) -> Self {
        FileWorkError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for FileWorkError {
    fn from(err: serde_json::Error) -> Self {
        FileWorkError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| FileWorkError::io(path, e))
    }
}

/// Collects multiple results into a single result
pub fn collect_errors<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(e) => errors.push(e),
        }
    }

    match errors.len() {
        0 => Ok(successes),
        1 => Err(errors.remove(0)),
        count => Err(FileWorkError::MultipleErrors { count, errors }),
    }
}
