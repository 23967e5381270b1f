//! Job discovery
//!
//! Expands (source, destination) pairs into individual [`CopyJob`]s,
//! mirrors the directory structure at the destination and applies the
//! admission policy. Admitted jobs are handed to a caller-supplied sink,
//! which may collect them in a list, a set or a channel.

use crate::core::CopyJob;
use crate::error::{FileWorkError, Result};
use crate::fs;
use rayon::prelude::*;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

/// Files whose timestamps are checked in parallel at once
const ADMISSION_BATCH: usize = 256;

/// Decides whether a discovered file needs a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Only when the source was modified after the destination
    Incremental,
    /// Every file, regardless of timestamps
    Always,
}

impl AdmissionPolicy {
    /// Policy matching a `replace_all` setting
    pub fn from_replace_all(replace_all: bool) -> Self {
        if replace_all {
            Self::Always
        } else {
            Self::Incremental
        }
    }

    /// Should `job` be admitted?
    ///
    /// A missing file has no timestamp and sorts before every real one, so
    /// a missing destination is always out of date.
    pub fn admits(&self, job: &CopyJob) -> bool {
        match self {
            Self::Always => true,
            Self::Incremental => {
                fs::modified_time(job.source()) > fs::modified_time(job.destination())
            }
        }
    }
}

/// Counters kept while collecting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Jobs handed to the sink
    pub admitted: usize,
    /// Files skipped as up to date
    pub skipped: usize,
    /// Destination directories created
    pub directories_created: usize,
}

impl AddAssign for CollectStats {
    fn add_assign(&mut self, other: Self) {
        self.admitted += other.admitted;
        self.skipped += other.skipped;
        self.directories_created += other.directories_created;
    }
}

/// How an enqueued pair is expanded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairKind {
    /// A single file job
    File(CopyJob),
    /// A whole directory tree
    Directory,
}

/// Decide whether a pair names one file or a directory tree
///
/// An existing destination file or an existing source file makes a
/// single-file job. A source file aimed at an existing directory lands
/// inside it under its own name.
pub fn classify(source: &Path, destination: &Path) -> Result<PairKind> {
    if fs::is_existing_file(destination) {
        return Ok(PairKind::File(CopyJob::new(source, destination)));
    }

    if fs::is_existing_file(source) {
        let destination = match source.file_name() {
            Some(name) if fs::is_existing_dir(destination) => destination.join(name),
            _ => destination.to_path_buf(),
        };
        return Ok(PairKind::File(CopyJob::new(source, destination)));
    }

    if fs::is_existing_dir(source) {
        return Ok(PairKind::Directory);
    }

    Err(FileWorkError::SourceNotFound(source.to_path_buf()))
}

/// Expands enqueued pairs into admitted jobs
#[derive(Debug, Clone)]
pub struct JobCollector {
    policy: AdmissionPolicy,
    stats: CollectStats,
}

impl JobCollector {
    /// Create a collector with the given admission policy
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            policy,
            stats: CollectStats::default(),
        }
    }

    /// Admission policy in use
    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Change the admission policy for later enqueues
    pub fn set_policy(&mut self, policy: AdmissionPolicy) {
        self.policy = policy;
    }

    /// Counters since creation or the last [`take_stats`](Self::take_stats)
    pub fn stats(&self) -> CollectStats {
        self.stats
    }

    /// Return the counters and reset them
    pub fn take_stats(&mut self) -> CollectStats {
        std::mem::take(&mut self.stats)
    }

    /// Expand a pair, file or directory, into admitted jobs
    ///
    /// The parent of a single-file destination is created when missing.
    pub fn enqueue<F>(&mut self, source: &Path, destination: &Path, sink: F) -> Result<()>
    where
        F: FnMut(CopyJob) -> Result<()>,
    {
        match classify(source, destination)? {
            PairKind::File(job) => {
                let create_directory = job
                    .destination()
                    .parent()
                    .map_or(false, |parent| !parent.as_os_str().is_empty() && !parent.is_dir());
                self.enqueue_file(job, create_directory, sink)?;
                Ok(())
            }
            PairKind::Directory => self.enqueue_directory(source, destination, sink),
        }
    }

    /// Mirror `source_dir` under `dest_dir` and admit its files
    pub fn enqueue_directory<F>(&mut self, source_dir: &Path, dest_dir: &Path, mut sink: F) -> Result<()>
    where
        F: FnMut(CopyJob) -> Result<()>,
    {
        if !fs::is_existing_dir(source_dir) {
            return Err(FileWorkError::SourceNotFound(source_dir.to_path_buf()));
        }
        if fs::same_file(source_dir, dest_dir) {
            return Err(FileWorkError::SameFile(dest_dir.to_path_buf()));
        }

        tracing::debug!(
            source = %source_dir.display(),
            destination = %dest_dir.display(),
            "collecting directory"
        );

        if fs::ensure_directory(dest_dir)? {
            self.stats.directories_created += 1;
        }
        for dir in fs::list_directories(source_dir) {
            if fs::ensure_directory(&fs::rebase(&dir, source_dir, dest_dir))? {
                self.stats.directories_created += 1;
            }
        }

        let mut files = fs::walk_files(source_dir);
        loop {
            let batch: Vec<PathBuf> = files.by_ref().take(ADMISSION_BATCH).collect();
            if batch.is_empty() {
                break;
            }

            let policy = self.policy;
            let checked: Vec<(CopyJob, bool)> = batch
                .into_par_iter()
                .map(|source| {
                    let destination = fs::rebase(&source, source_dir, dest_dir);
                    let job = CopyJob::new(source, destination);
                    let admitted = policy.admits(&job);
                    (job, admitted)
                })
                .collect();

            for (job, admitted) in checked {
                if admitted {
                    self.stats.admitted += 1;
                    sink(job)?;
                } else {
                    self.stats.skipped += 1;
                }
            }
        }

        Ok(())
    }

    /// Admit a single job, optionally creating its destination directory
    ///
    /// Returns whether the job passed the admission policy. A job whose
    /// source and destination are the same file is rejected.
    pub fn enqueue_file<F>(&mut self, job: CopyJob, create_directory: bool, mut sink: F) -> Result<bool>
    where
        F: FnMut(CopyJob) -> Result<()>,
    {
        if fs::same_file(job.source(), job.destination()) {
            return Err(FileWorkError::SameFile(job.destination().to_path_buf()));
        }

        if !self.policy.admits(&job) {
            tracing::trace!("up to date: {}", job);
            self.stats.skipped += 1;
            return Ok(false);
        }

        if create_directory {
            if let Some(parent) = job.destination().parent() {
                if fs::ensure_directory(parent)? {
                    self.stats.directories_created += 1;
                }
            }
        }

        self.stats.admitted += 1;
        sink(job)?;
        Ok(true)
    }
}
