//! Incremental copy facade
//!
//! Pairs are collected up front into a pending list, then [`FileCopier::run`]
//! snapshots the list and drains it with the worker pool. For very large
//! trees [`FileCopier::copy_streaming`] overlaps collection and copying.

use crate::config::WorkerConfig;
use crate::core::collector::{AdmissionPolicy, CollectStats, JobCollector};
use crate::core::scheduler::{job_channel, CancellationToken, RunSummary, SnapshotQueue, WorkerPool};
use crate::core::{transfer, CopyJob};
use crate::error::{collect_errors, FileWorkError, Result};
use crate::progress::ProgressReporter;
use std::path::Path;
use std::thread;

/// Copies new or changed files with a pool of workers
pub struct FileCopier {
    /// Configuration
    config: WorkerConfig,
    /// Expands enqueued pairs
    collector: JobCollector,
    /// Jobs admitted since the last run
    pending: Vec<CopyJob>,
    /// Progress reporter
    progress: Option<ProgressReporter>,
}

impl FileCopier {
    /// Create a copier with the given settings
    pub fn new(config: WorkerConfig) -> Self {
        let policy = AdmissionPolicy::from_replace_all(config.replace_all);
        Self {
            config,
            collector: JobCollector::new(policy),
            pending: Vec::new(),
            progress: None,
        }
    }

    /// Set progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Current settings
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Settings for later enqueues and runs
    pub fn config_mut(&mut self) -> &mut WorkerConfig {
        &mut self.config
    }

    /// Switch to 2 workers with 16 MiB buffers
    pub fn apply_large_transfer_preset(&mut self) {
        self.config.apply_large_transfer_preset();
    }

    fn sync_policy(&mut self) {
        self.collector
            .set_policy(AdmissionPolicy::from_replace_all(self.config.replace_all));
    }

    /// Queue a file or a whole directory tree
    ///
    /// Fails with [`FileWorkError::SourceNotFound`] when `source` does not
    /// exist; jobs admitted by earlier calls stay queued.
    pub fn enqueue(&mut self, source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<()> {
        self.sync_policy();
        let pending = &mut self.pending;
        self.collector
            .enqueue(source.as_ref(), destination.as_ref(), |job| {
                pending.push(job);
                Ok(())
            })
    }

    /// Queue several pairs, attempting every one before reporting errors
    pub fn enqueue_many<I, S, D>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, D)>,
        S: AsRef<Path>,
        D: AsRef<Path>,
    {
        let results: Vec<Result<()>> = pairs
            .into_iter()
            .map(|(source, destination)| self.enqueue(source, destination))
            .collect();
        collect_errors(results).map(|_| ())
    }

    /// Queue every file below `source_dir`, mirroring its directories
    pub fn enqueue_directory(
        &mut self,
        source_dir: impl AsRef<Path>,
        dest_dir: impl AsRef<Path>,
    ) -> Result<()> {
        self.sync_policy();
        let pending = &mut self.pending;
        self.collector
            .enqueue_directory(source_dir.as_ref(), dest_dir.as_ref(), |job| {
                pending.push(job);
                Ok(())
            })
    }

    /// Queue one job if it is out of date; returns whether it was queued
    pub fn enqueue_file(&mut self, job: CopyJob, create_directory: bool) -> Result<bool> {
        self.sync_policy();
        let pending = &mut self.pending;
        self.collector.enqueue_file(job, create_directory, |job| {
            pending.push(job);
            Ok(())
        })
    }

    /// Jobs waiting for the next run
    pub fn pending(&self) -> &[CopyJob] {
        &self.pending
    }

    /// Collection counters since the last run
    pub fn collect_stats(&self) -> CollectStats {
        self.collector.stats()
    }

    /// Copy every pending job and wait for all workers
    ///
    /// The pending list is empty afterwards, so the copier can be reused.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<RunSummary> {
        let stats = self.collector.take_stats();
        let queue = SnapshotQueue::new(std::mem::take(&mut self.pending));
        tracing::info!(
            jobs = queue.len(),
            skipped = stats.skipped,
            "starting copy run"
        );

        if let Some(progress) = &self.progress {
            progress.set_total_jobs(queue.len() as u64);
        }

        let buffer_size = self.config.effective_buffer_size();
        let summary = WorkerPool::new(self.config.effective_workers()).run(
            &queue,
            cancel,
            self.progress.as_ref(),
            |job: &CopyJob, cancel| transfer::copy_file(job, buffer_size, cancel),
        )?;

        self.finish_progress(&summary);
        Ok(summary)
    }

    /// Collect and copy `source` into `destination` at the same time
    ///
    /// A producer thread walks the source and feeds admitted jobs through a
    /// channel while the workers copy them. Jobs already pending are left
    /// for the next [`run`](Self::run).
    pub fn copy_streaming(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let source = source.as_ref();
        let destination = destination.as_ref();
        let mut collector = JobCollector::new(AdmissionPolicy::from_replace_all(self.config.replace_all));
        let (sender, queue) = job_channel();
        let pool = WorkerPool::new(self.config.effective_workers());
        let buffer_size = self.config.effective_buffer_size();
        let progress = self.progress.as_ref();

        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            "starting streaming copy"
        );

        let (collected, summary) = thread::scope(|scope| {
            let producer = thread::Builder::new()
                .name("filework-collector".to_string())
                .spawn_scoped(scope, move || {
                    let result = collector.enqueue(source, destination, |job| {
                        if cancel.is_cancelled() {
                            return Err(FileWorkError::Cancelled);
                        }
                        if let Some(progress) = progress {
                            progress.add_total_jobs(1);
                        }
                        sender.send(job)
                    });
                    result.map(|()| collector.take_stats())
                });

            let producer = match producer {
                Ok(handle) => handle,
                Err(e) => {
                    // Sender was moved into the failed closure and dropped,
                    // so no worker would ever receive a job.
                    let error = FileWorkError::WorkerPoolError(format!("failed to spawn collector: {}", e));
                    return (Err(error), None);
                }
            };

            let summary = pool.run(&queue, cancel, progress, |job: &CopyJob, cancel| {
                transfer::copy_file(job, buffer_size, cancel)
            });
            if summary.is_err() {
                cancel.cancel();
            }

            let collected = producer
                .join()
                .unwrap_or_else(|_| Err(FileWorkError::WorkerPoolError("collector thread panicked".to_string())));
            (collected, Some(summary))
        });

        let mut summary = match summary {
            Some(summary) => summary?,
            None => return Err(collected.err().unwrap_or(FileWorkError::Cancelled)),
        };

        match collected {
            Ok(stats) => {
                summary.jobs_queued = stats.admitted;
                tracing::debug!(skipped = stats.skipped, "collector finished");
            }
            Err(FileWorkError::Cancelled) => {}
            Err(e) => return Err(e),
        }

        self.finish_progress(&summary);
        Ok(summary)
    }

    fn finish_progress(&self, summary: &RunSummary) {
        if let Some(progress) = &self.progress {
            if summary.cancelled {
                progress.abandon();
            } else {
                progress.finish();
            }
        }
    }
}

impl Default for FileCopier {
    fn default() -> Self {
        Self::new(WorkerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const PAST: i64 = 1_500_000_000;

    fn create_test_structure(dir: &Path) {
        std::fs::create_dir_all(dir.join("subdir/nested")).unwrap();
        std::fs::create_dir_all(dir.join("empty")).unwrap();

        let files = [
            ("file1.txt", b"Hello, World!".to_vec()),
            ("file2.txt", b"Test content".to_vec()),
            ("subdir/file3.txt", vec![b'x'; 70_000]),
            ("subdir/nested/file4.bin", (0..=255u8).collect()),
        ];
        for (name, content) in files {
            let path = dir.join(name);
            std::fs::write(&path, content).unwrap();
            filetime::set_file_mtime(&path, FileTime::from_unix_time(PAST, 0)).unwrap();
        }
    }

    fn small_config() -> WorkerConfig {
        WorkerConfig {
            concurrent_workers: 3,
            transfer_buffer_size: 1024,
            ..Default::default()
        }
    }

    fn assert_trees_equal(source: &Path, dest: &Path) {
        for file in crate::fs::list_files(source) {
            let relative = file.strip_prefix(source).unwrap();
            assert_eq!(
                std::fs::read(&file).unwrap(),
                std::fs::read(dest.join(relative)).unwrap(),
                "content mismatch for {}",
                relative.display()
            );
        }
        for dir in crate::fs::list_directories(source) {
            assert!(dest.join(dir.strip_prefix(source).unwrap()).is_dir());
        }
    }

    #[test]
    fn test_full_copy_mirrors_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());
        let dest = dst.path().join("copy");

        let mut copier = FileCopier::new(small_config());
        copier.enqueue(src.path(), &dest).unwrap();
        assert_eq!(copier.pending().len(), 4);

        let summary = copier.run(&CancellationToken::new()).unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.jobs_queued, 4);
        assert_eq!(summary.jobs_succeeded, 4);
        assert_eq!(summary.bytes_transferred, 13 + 12 + 70_000 + 256);
        assert!(dest.join("empty").is_dir());
        assert_trees_equal(src.path(), &dest);
        assert!(copier.pending().is_empty());
    }

    #[test]
    fn test_incremental_rerun_admits_nothing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let mut copier = FileCopier::new(small_config());
        copier.enqueue(src.path(), dst.path()).unwrap();
        copier.run(&CancellationToken::new()).unwrap();

        copier.enqueue(src.path(), dst.path()).unwrap();
        assert!(copier.pending().is_empty());
        assert_eq!(copier.collect_stats().skipped, 4);

        let summary = copier.run(&CancellationToken::new()).unwrap();
        assert_eq!(summary.jobs_attempted, 0);
    }

    #[test]
    fn test_modified_source_is_recopied() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let mut copier = FileCopier::new(small_config());
        copier.enqueue(src.path(), dst.path()).unwrap();
        copier.run(&CancellationToken::new()).unwrap();

        let changed = src.path().join("subdir/file3.txt");
        std::fs::write(&changed, b"changed").unwrap();
        filetime::set_file_mtime(&changed, FileTime::from_unix_time(PAST * 2, 0)).unwrap();

        copier.enqueue(src.path(), dst.path()).unwrap();
        assert_eq!(copier.pending(), &[CopyJob::new(&changed, dst.path().join("subdir/file3.txt"))]);

        copier.run(&CancellationToken::new()).unwrap();
        assert_eq!(std::fs::read(dst.path().join("subdir/file3.txt")).unwrap(), b"changed");
    }

    #[test]
    fn test_replace_all_is_idempotent() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let mut copier = FileCopier::new(WorkerConfig {
            replace_all: true,
            ..small_config()
        });
        for _ in 0..2 {
            copier.enqueue(src.path(), dst.path()).unwrap();
            assert_eq!(copier.pending().len(), 4);
            let summary = copier.run(&CancellationToken::new()).unwrap();
            assert_eq!(summary.jobs_succeeded, 4);
            assert_trees_equal(src.path(), dst.path());
        }
    }

    #[test]
    fn test_single_file_copy() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let mut copier = FileCopier::default();
        copier.enqueue(src.path().join("file1.txt"), dst.path()).unwrap();
        copier.run(&CancellationToken::new()).unwrap();

        assert_eq!(std::fs::read(dst.path().join("file1.txt")).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_enqueue_missing_source_keeps_earlier_jobs() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let mut copier = FileCopier::new(small_config());
        copier.enqueue(src.path(), dst.path()).unwrap();
        let err = copier.enqueue(src.path().join("missing"), dst.path()).unwrap_err();

        assert!(matches!(err, FileWorkError::SourceNotFound(_)));
        assert_eq!(copier.pending().len(), 4);
    }

    #[test]
    fn test_replace_all_refuses_copy_onto_itself() {
        let src = TempDir::new().unwrap();
        create_test_structure(src.path());
        let file = src.path().join("file1.txt");

        let mut copier = FileCopier::new(WorkerConfig {
            replace_all: true,
            ..small_config()
        });
        let err = copier.enqueue(&file, &file).unwrap_err();
        assert!(matches!(err, FileWorkError::SameFile(_)));

        let summary = copier.run(&CancellationToken::new()).unwrap();
        assert_eq!(summary.jobs_succeeded, 0);
        assert_eq!(std::fs::read(&file).unwrap(), b"Hello, World!");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_copied_with_target_content() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        create_test_structure(src.path());
        std::fs::write(target.path().join("t.txt"), b"linked content").unwrap();
        std::os::unix::fs::symlink(target.path().join("t.txt"), src.path().join("link.txt")).unwrap();

        let mut copier = FileCopier::new(small_config());
        copier.enqueue(src.path(), dst.path()).unwrap();
        let summary = copier.run(&CancellationToken::new()).unwrap();

        assert_eq!(summary.jobs_succeeded, 5);
        assert_eq!(std::fs::read(dst.path().join("link.txt")).unwrap(), b"linked content");
    }

    #[test]
    fn test_enqueue_many_reports_every_error() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let mut copier = FileCopier::new(small_config());
        let result = copier.enqueue_many([
            (src.path().join("gone-1"), dst.path().join("a")),
            (src.path().to_path_buf(), dst.path().join("b")),
            (src.path().join("gone-2"), dst.path().join("c")),
        ]);

        match result {
            Err(FileWorkError::MultipleErrors { count, .. }) => assert_eq!(count, 2),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(copier.pending().len(), 4);
    }

    #[test]
    fn test_enqueue_file_respects_timestamps() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());
        let dest = dst.path().join("file1.txt");
        std::fs::write(&dest, b"already here").unwrap();

        let mut copier = FileCopier::new(small_config());
        let queued = copier
            .enqueue_file(CopyJob::new(src.path().join("file1.txt"), &dest), false)
            .unwrap();

        assert!(!queued);
        assert!(copier.pending().is_empty());
    }

    #[test]
    fn test_failed_job_does_not_affect_others() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let mut copier = FileCopier::new(small_config());
        copier.enqueue_directory(src.path(), dst.path()).unwrap();
        std::fs::remove_file(src.path().join("file2.txt")).unwrap();

        let summary = copier.run(&CancellationToken::new()).unwrap();

        assert_eq!(summary.jobs_attempted, 4);
        assert_eq!(summary.jobs_succeeded, 3);
        assert_eq!(summary.jobs_failed(), 1);
        assert_eq!(summary.failures[0].destination, dst.path().join("file2.txt"));
        assert!(dst.path().join("subdir/nested/file4.bin").is_file());
        assert!(!dst.path().join("file2.txt").exists());
    }

    #[test]
    fn test_cancelled_before_run_copies_nothing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let mut copier = FileCopier::new(small_config());
        copier.enqueue(src.path(), dst.path()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = copier.run(&cancel).unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.jobs_attempted, 0);
        assert!(crate::fs::list_files(dst.path()).is_empty());
    }

    #[test]
    fn test_streaming_copy_mirrors_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let copier = FileCopier::new(small_config());
        let summary = copier
            .copy_streaming(src.path(), dst.path(), &CancellationToken::new())
            .unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.jobs_queued, 4);
        assert_eq!(summary.jobs_succeeded, 4);
        assert_trees_equal(src.path(), dst.path());

        let rerun = copier
            .copy_streaming(src.path(), dst.path(), &CancellationToken::new())
            .unwrap();
        assert_eq!(rerun.jobs_queued, 0);
        assert_eq!(rerun.jobs_attempted, 0);
    }

    #[test]
    fn test_streaming_copy_missing_source() {
        let dst = TempDir::new().unwrap();
        let copier = FileCopier::new(small_config());

        let err = copier
            .copy_streaming(PathBuf::from("/definitely/not/here"), dst.path(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, FileWorkError::SourceNotFound(_)));
    }

    #[test]
    fn test_streaming_copy_cancelled() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = FileCopier::new(small_config())
            .copy_streaming(src.path(), dst.path(), &cancel)
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.jobs_attempted, 0);
    }
}
