//! Progress reporter implementation
//!
//! Uses indicatif for a job counter and a byte counter. Workers call into
//! the reporter from many threads at once, so every counter is atomic.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Progress reporter for copy and merge runs
pub struct ProgressReporter {
    /// Multi-progress container
    multi: MultiProgress,
    /// Finished jobs
    jobs_bar: ProgressBar,
    /// Transferred bytes
    bytes_bar: ProgressBar,
    /// Total jobs expected
    total_jobs: AtomicU64,
    /// Jobs finished so far, successful or not
    jobs_done: AtomicU64,
    /// Bytes transferred so far
    bytes_transferred: AtomicU64,
    /// Is progress enabled
    enabled: AtomicBool,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let jobs_bar = multi.add(ProgressBar::new(0));
        jobs_bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} jobs ({percent}%)")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        jobs_bar.set_prefix("Jobs");

        let bytes_bar = multi.add(ProgressBar::new_spinner());
        bytes_bar.set_style(
            ProgressStyle::default_spinner()
                .template("{prefix:.bold.dim} {spinner:.green} {bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bytes_bar.set_prefix("Data");

        Self {
            multi,
            jobs_bar,
            bytes_bar,
            total_jobs: AtomicU64::new(0),
            jobs_done: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.enabled.store(false, Ordering::SeqCst);
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Set the number of jobs expected
    pub fn set_total_jobs(&self, total: u64) {
        self.total_jobs.store(total, Ordering::Relaxed);
        self.jobs_bar.set_length(total);
    }

    /// Raise the expected job count, for runs that discover jobs as they go
    pub fn add_total_jobs(&self, count: u64) {
        let total = self.total_jobs.fetch_add(count, Ordering::Relaxed) + count;
        self.jobs_bar.set_length(total);
    }

    /// Record one finished job and the bytes it moved
    pub fn job_finished(&self, bytes: u64) {
        self.jobs_done.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
        self.jobs_bar.inc(1);
        self.bytes_bar.inc(bytes);
    }

    /// Jobs finished so far
    pub fn jobs_done(&self) -> u64 {
        self.jobs_done.load(Ordering::Relaxed)
    }

    /// Bytes transferred so far
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    /// Finish all bars
    pub fn finish(&self) {
        self.jobs_bar.finish();
        self.bytes_bar.finish();
    }

    /// Leave bars in place after a cancelled run
    pub fn abandon(&self) {
        self.jobs_bar.abandon();
        self.bytes_bar.abandon();
    }

    /// Check if progress is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
