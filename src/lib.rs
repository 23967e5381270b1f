//! # FileWork - Incremental Bulk Copy and Merge
//!
//! FileWork copies or merges whole directory trees with a fixed-size pool
//! of worker threads, so the I/O for many files overlaps.
//!
//! ## Features
//!
//! - **Incremental Copy**: Only files whose source is newer than the destination
//! - **Tree Mirroring**: Destination directories are created up front, empty ones included
//! - **Deterministic Merge**: Sources sharing a destination are concatenated in sorted path order
//! - **Cooperative Cancellation**: Workers stop between buffer chunks
//! - **Failure Isolation**: A failing or panicking job never stops its siblings
//! - **Streaming Mode**: Directory scanning overlaps with copying through a channel
//!
//! ## Quick Start
//!
//! ```no_run
//! use filework::config::WorkerConfig;
//! use filework::core::{CancellationToken, FileCopier};
//!
//! let mut copier = FileCopier::new(WorkerConfig::default());
//! copier.enqueue("/source", "/destination").unwrap();
//!
//! let summary = copier.run(&CancellationToken::new()).unwrap();
//! println!("Copied {} files ({} bytes)", summary.jobs_succeeded, summary.bytes_transferred);
//! ```
//!
//! ## Merging
//!
//! ```no_run
//! use filework::config::WorkerConfig;
//! use filework::core::{CancellationToken, FileMerger};
//!
//! let mut merger = FileMerger::new(WorkerConfig::large_transfer());
//! merger.enqueue("/logs/node-a", "/logs/merged").unwrap();
//! merger.enqueue("/logs/node-b", "/logs/merged").unwrap();
//!
//! let summary = merger.run(&CancellationToken::new()).unwrap();
//! summary.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod progress;

// Re-export commonly used types
pub use crate::config::WorkerConfig;
pub use crate::core::{CancellationToken, CopyJob, FileCopier, FileMerger, MergeJob, RunSummary};
pub use crate::error::{FileWorkError, Result};
pub use crate::progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use filework::prelude::*;
    //! ```

    pub use crate::config::WorkerConfig;
    pub use crate::core::{
        group_merge_requests, CancellationToken, CopyJob, FileCopier, FileMerger, MergeJob,
        RunSummary, WorkerPool,
    };
    pub use crate::error::{FileWorkError, Result};
    pub use crate::fs::count_accessible_files;
    pub use crate::progress::ProgressReporter;
}
