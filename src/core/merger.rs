//! Merge facade
//!
//! Merge requests are kept sorted by destination, then source, so the
//! concatenation order of every output is reproducible no matter how the
//! requests were enqueued.

use crate::config::WorkerConfig;
use crate::core::collector::{AdmissionPolicy, JobCollector};
use crate::core::scheduler::{CancellationToken, RunSummary, SnapshotQueue, WorkerPool};
use crate::core::{transfer, CopyJob, MergeJob};
use crate::error::{collect_errors, Result};
use crate::progress::ProgressReporter;
use std::collections::BTreeSet;
use std::path::Path;

/// Group merge requests into one job per destination
///
/// Requests are sorted and deduplicated; each run of requests whose
/// destinations match (ignoring case) becomes one [`MergeJob`] with its
/// sources in sorted order.
pub fn group_merge_requests<I>(requests: I) -> Result<Vec<MergeJob>>
where
    I: IntoIterator<Item = CopyJob>,
{
    let sorted: BTreeSet<CopyJob> = requests.into_iter().collect();

    let mut jobs = Vec::new();
    let mut group: Vec<CopyJob> = Vec::new();
    for request in sorted {
        if group.last().map_or(false, |last| !last.same_destination(&request)) {
            jobs.push(MergeJob::from_group(&group)?);
            group.clear();
        }
        group.push(request);
    }
    if !group.is_empty() {
        jobs.push(MergeJob::from_group(&group)?);
    }

    Ok(jobs)
}

/// Concatenates source files into destinations with a pool of workers
pub struct FileMerger {
    /// Configuration
    config: WorkerConfig,
    /// Expands enqueued pairs; merges never skip on timestamps
    collector: JobCollector,
    /// Sorted merge requests since the last run
    requests: BTreeSet<CopyJob>,
    /// Progress reporter
    progress: Option<ProgressReporter>,
}

impl FileMerger {
    /// Create a merger with the given settings
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            collector: JobCollector::new(AdmissionPolicy::Always),
            requests: BTreeSet::new(),
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

    /// Settings for later runs
    pub fn config_mut(&mut self) -> &mut WorkerConfig {
        &mut self.config
    }

    /// Switch to 2 workers with 16 MiB buffers
    pub fn apply_large_transfer_preset(&mut self) {
        self.config.apply_large_transfer_preset();
    }

    /// Request that `source` (a file or a directory tree) be merged into `destination`
    pub fn enqueue(&mut self, source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<()> {
        let requests = &mut self.requests;
        self.collector
            .enqueue(source.as_ref(), destination.as_ref(), |job| {
                requests.insert(job);
                Ok(())
            })
    }

    /// Enqueue several pairs, attempting every one before reporting errors
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

    /// Request every file below `source_dir` be merged into the mirrored path under `dest_dir`
    pub fn enqueue_directory(
        &mut self,
        source_dir: impl AsRef<Path>,
        dest_dir: impl AsRef<Path>,
    ) -> Result<()> {
        let requests = &mut self.requests;
        self.collector
            .enqueue_directory(source_dir.as_ref(), dest_dir.as_ref(), |job| {
                requests.insert(job);
                Ok(())
            })
    }

    /// Add one merge request, optionally creating its destination directory
    pub fn enqueue_file(&mut self, job: CopyJob, create_directory: bool) -> Result<bool> {
        let requests = &mut self.requests;
        self.collector.enqueue_file(job, create_directory, |job| {
            requests.insert(job);
            Ok(())
        })
    }

    /// Number of distinct requests waiting for the next run
    pub fn pending(&self) -> usize {
        self.requests.len()
    }

    /// The merge jobs the next run would execute
    pub fn merge_jobs(&self) -> Result<Vec<MergeJob>> {
        group_merge_requests(self.requests.iter().cloned())
    }

    /// Run every pending merge and wait for all workers
    ///
    /// The request set is empty afterwards, so the merger can be reused.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<RunSummary> {
        self.collector.take_stats();
        let jobs = group_merge_requests(std::mem::take(&mut self.requests))?;
        let queue = SnapshotQueue::new(jobs);
        tracing::info!(jobs = queue.len(), "starting merge run");

        if let Some(progress) = &self.progress {
            progress.set_total_jobs(queue.len() as u64);
        }

        let buffer_size = self.config.effective_buffer_size();
        let clean_output = self.config.clean_output;
        let summary = WorkerPool::new(self.config.effective_workers()).run(
            &queue,
            cancel,
            self.progress.as_ref(),
            |job: &MergeJob, cancel| transfer::merge_files(job, buffer_size, clean_output, cancel),
        )?;

        if let Some(progress) = &self.progress {
            if summary.cancelled {
                progress.abandon();
            } else {
                progress.finish();
            }
        }

        Ok(summary)
    }
}

impl Default for FileMerger {
    fn default() -> Self {
        Self::new(WorkerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::paths_equal_ignore_case;
    use crate::error::FileWorkError;
    use proptest::prelude::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn shape(jobs: &[MergeJob]) -> Vec<(PathBuf, Vec<PathBuf>)> {
        jobs.iter()
            .map(|job| (job.destination().to_path_buf(), job.sources().to_vec()))
            .collect()
    }

    #[test]
    fn test_grouping_example() {
        let jobs = group_merge_requests([
            CopyJob::new("a", "out"),
            CopyJob::new("b", "out"),
            CopyJob::new("c", "other"),
        ])
        .unwrap();

        assert_eq!(
            shape(&jobs),
            vec![
                (PathBuf::from("other"), vec![PathBuf::from("c")]),
                (PathBuf::from("out"), vec![PathBuf::from("a"), PathBuf::from("b")]),
            ]
        );
    }

    #[test]
    fn test_grouping_ignores_case_and_duplicates() {
        let jobs = group_merge_requests([
            CopyJob::new("B", "Out"),
            CopyJob::new("a", "out"),
            CopyJob::new("a", "out"),
        ])
        .unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].sources(), &[PathBuf::from("a"), PathBuf::from("B")]);
    }

    #[test]
    fn test_grouping_empty() {
        assert!(group_merge_requests(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_merge_trees_in_source_order() {
        let root = TempDir::new().unwrap();
        let part_a = root.path().join("a");
        let part_b = root.path().join("b");
        let out = root.path().join("out");
        write_file(&part_a.join("log.txt"), b"alpha;");
        write_file(&part_b.join("log.txt"), b"beta;");
        write_file(&part_a.join("only/a.txt"), b"solo");

        // Enqueue order must not matter.
        let mut merger = FileMerger::new(WorkerConfig {
            concurrent_workers: 2,
            transfer_buffer_size: 4,
            ..Default::default()
        });
        merger.enqueue(&part_b, &out).unwrap();
        merger.enqueue(&part_a, &out).unwrap();
        assert_eq!(merger.pending(), 3);
        assert_eq!(merger.merge_jobs().unwrap().len(), 2);

        let summary = merger.run(&CancellationToken::new()).unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.jobs_queued, 2);
        assert_eq!(std::fs::read(out.join("log.txt")).unwrap(), b"alpha;beta;");
        assert_eq!(std::fs::read(out.join("only/a.txt")).unwrap(), b"solo");
        assert_eq!(merger.pending(), 0);
    }

    #[test]
    fn test_merge_files_into_single_output() {
        let root = TempDir::new().unwrap();
        let first = root.path().join("1.part");
        let second = root.path().join("2.part");
        let out = root.path().join("joined/whole.bin");
        write_file(&first, b"one-");
        write_file(&second, b"two");

        let mut merger = FileMerger::default();
        merger
            .enqueue_many([(&second, &out), (&first, &out)])
            .unwrap();
        assert!(out.parent().unwrap().is_dir());

        merger.run(&CancellationToken::new()).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"one-two");
    }

    #[test]
    fn test_rerun_rebuilds_output_when_clean() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("in.txt");
        let out = root.path().join("out.txt");
        write_file(&source, b"data");

        let mut merger = FileMerger::default();
        for _ in 0..2 {
            merger.enqueue_file(CopyJob::new(&source, &out), false).unwrap();
            merger.run(&CancellationToken::new()).unwrap();
        }

        assert_eq!(std::fs::read(&out).unwrap(), b"data");
    }

    #[test]
    fn test_rerun_appends_without_clean() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("in.txt");
        let out = root.path().join("out.txt");
        write_file(&source, b"data");

        let mut merger = FileMerger::new(WorkerConfig {
            clean_output: false,
            ..Default::default()
        });
        for _ in 0..2 {
            merger.enqueue_file(CopyJob::new(&source, &out), false).unwrap();
            merger.run(&CancellationToken::new()).unwrap();
        }

        assert_eq!(std::fs::read(&out).unwrap(), b"datadata");
    }

    #[test]
    fn test_missing_source_rejected_at_enqueue() {
        let root = TempDir::new().unwrap();
        let mut merger = FileMerger::default();

        let err = merger
            .enqueue(root.path().join("nothing"), root.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, FileWorkError::SourceNotFound(_)));
        assert_eq!(merger.pending(), 0);
    }

    #[test]
    fn test_vanished_source_fails_only_its_merge() {
        let root = TempDir::new().unwrap();
        let kept = root.path().join("kept.txt");
        let vanished = root.path().join("vanished.txt");
        write_file(&kept, b"ok");
        write_file(&vanished, b"gone soon");

        let mut merger = FileMerger::default();
        merger.enqueue(&kept, root.path().join("good.out")).unwrap();
        merger.enqueue(&vanished, root.path().join("bad.out")).unwrap();
        std::fs::remove_file(&vanished).unwrap();

        let summary = merger.run(&CancellationToken::new()).unwrap();

        assert_eq!(summary.jobs_succeeded, 1);
        assert_eq!(summary.jobs_failed(), 1);
        assert_eq!(summary.failures[0].destination, root.path().join("bad.out"));
        assert_eq!(std::fs::read(root.path().join("good.out")).unwrap(), b"ok");
    }

    fn request_strategy() -> impl Strategy<Value = Vec<CopyJob>> {
        proptest::collection::vec((0u8..12, 0u8..4, any::<bool>()), 0..48).prop_map(|raw| {
            raw.into_iter()
                .map(|(source, dest, upper)| {
                    let dest = if upper {
                        format!("/OUT/D{}", dest)
                    } else {
                        format!("/out/d{}", dest)
                    };
                    CopyJob::new(format!("/src/s{}", source), dest)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_grouping_partitions_requests(requests in request_strategy()) {
            let groups = group_merge_requests(requests.clone()).unwrap();
            let unique: BTreeSet<CopyJob> = requests.iter().cloned().collect();

            let total: usize = groups.iter().map(|g| g.sources().len()).sum();
            prop_assert_eq!(total, unique.len());

            for (i, a) in groups.iter().enumerate() {
                for b in &groups[i + 1..] {
                    prop_assert!(!paths_equal_ignore_case(a.destination(), b.destination()));
                }
            }

            for job in &unique {
                let covered = groups.iter().any(|g| {
                    paths_equal_ignore_case(g.destination(), job.destination())
                        && g.sources().iter().any(|s| s == job.source())
                });
                prop_assert!(covered, "request {} missing from groups", job);
            }
        }

        #[test]
        fn prop_grouping_is_order_independent(requests in request_strategy()) {
            let mut reversed = requests.clone();
            reversed.reverse();

            let forward = group_merge_requests(requests).unwrap();
            let backward = group_merge_requests(reversed).unwrap();
            prop_assert_eq!(shape(&forward), shape(&backward));
        }
    }
}
