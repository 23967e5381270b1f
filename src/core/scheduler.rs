//! Job dispatch and the worker pool
//!
//! Two job sources are provided:
//! - [`SnapshotQueue`]: a fixed job list handed out by an atomic cursor
//! - [`ChannelQueue`]: a crossbeam channel fed while workers are running;
//!   dropping the last [`JobSender`] tells consumers no more jobs will come
//!
//! Either way each job reaches exactly one worker, once.

use crate::core::{CopyJob, MergeJob};
use crate::error::{FileWorkError, Result};
use crate::progress::ProgressReporter;
use crossbeam::channel::{self, Receiver, Sender};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Cooperative cancellation shared by a run's workers and producers
///
/// Cancelling sets a flag for loop checks and disconnects a channel, so
/// a worker blocked waiting for a job wakes up immediately.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<CancelState>,
}

#[derive(Debug)]
struct CancelState {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancellationToken {
    /// Create a token that is not yet cancelled
    pub fn new() -> Self {
        let (trigger, signal) = channel::bounded(0);
        Self {
            inner: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Channel that disconnects on cancellation
    fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of work the pool can report on
pub trait PoolJob: Send + fmt::Display {
    /// File this job writes
    fn destination(&self) -> &Path;
}

impl PoolJob for CopyJob {
    fn destination(&self) -> &Path {
        CopyJob::destination(self)
    }
}

impl PoolJob for MergeJob {
    fn destination(&self) -> &Path {
        MergeJob::destination(self)
    }
}

/// Source of jobs shared by all workers of a pool
pub trait JobSource<J>: Sync {
    /// Claim the next job exclusively
    ///
    /// Returns `None` once no job is left and none will arrive, or when
    /// cancellation is observed while waiting.
    fn claim(&self, cancel: &CancellationToken) -> Option<J>;

    /// Number of jobs, when known up front
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// Immutable job snapshot dispatched by an atomic cursor
#[derive(Debug)]
pub struct SnapshotQueue<J> {
    jobs: Box<[J]>,
    cursor: AtomicUsize,
}

impl<J> SnapshotQueue<J> {
    /// Freeze `jobs` into a queue
    pub fn new(jobs: Vec<J>) -> Self {
        Self {
            jobs: jobs.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Number of jobs in the snapshot
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Is the snapshot empty?
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs handed out so far
    pub fn claimed(&self) -> usize {
        self.cursor.load(Ordering::Acquire).min(self.jobs.len())
    }
}

impl<J: Clone + Send + Sync> JobSource<J> for SnapshotQueue<J> {
    fn claim(&self, _cancel: &CancellationToken) -> Option<J> {
        // Past the end the cursor keeps growing, bounded by one step per worker.
        let index = self.cursor.fetch_add(1, Ordering::AcqRel);
        self.jobs.get(index).cloned()
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.jobs.len())
    }
}

/// Producer half of a [`ChannelQueue`]
#[derive(Debug)]
pub struct JobSender<J> {
    sender: Sender<J>,
}

impl<J> Clone for JobSender<J> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<J> JobSender<J> {
    /// Hand a job to the workers
    pub fn send(&self, job: J) -> Result<()> {
        self.sender
            .send(job)
            .map_err(|_| FileWorkError::WorkerPoolError("all workers have stopped".to_string()))
    }
}

/// Consumer half of a producer/consumer job channel
#[derive(Debug)]
pub struct ChannelQueue<J> {
    receiver: Receiver<J>,
}

/// Create a job channel; the queue is exhausted once every sender is dropped
pub fn job_channel<J>() -> (JobSender<J>, ChannelQueue<J>) {
    let (sender, receiver) = channel::unbounded();
    (JobSender { sender }, ChannelQueue { receiver })
}

impl<J: Send> JobSource<J> for ChannelQueue<J> {
    fn claim(&self, cancel: &CancellationToken) -> Option<J> {
        if cancel.is_cancelled() {
            return None;
        }
        channel::select! {
            recv(self.receiver) -> job => job.ok(),
            recv(cancel.signal()) -> _ => None,
        }
    }
}

/// A job that finished with an error
#[derive(Debug)]
pub struct JobFailure {
    /// Destination of the failed job
    pub destination: PathBuf,
    /// What went wrong
    pub error: FileWorkError,
}

/// Outcome of one pool run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Workers started
    pub workers: usize,
    /// Jobs made available to the pool
    pub jobs_queued: usize,
    /// Jobs claimed by a worker
    pub jobs_attempted: u64,
    /// Jobs that completed
    pub jobs_succeeded: u64,
    /// Bytes written by completed jobs; partial writes of interrupted or
    /// failed jobs are not counted
    pub bytes_transferred: u64,
    /// Jobs that failed; their destinations may be absent or partial
    pub failures: Vec<JobFailure>,
    /// Jobs stopped mid-stream by cancellation; destinations may be partial
    pub interrupted: Vec<PathBuf>,
    /// Was cancellation requested during the run?
    pub cancelled: bool,
    /// Wall-clock duration
    pub duration: Duration,
}

impl RunSummary {
    /// Did every attempted job complete?
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.interrupted.is_empty()
    }

    /// Number of failed jobs
    pub fn jobs_failed(&self) -> usize {
        self.failures.len()
    }

    /// Average throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_transferred as f64 / secs
        } else {
            0.0
        }
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Run Summary ===");
        println!("Workers:         {}", self.workers);
        println!("Jobs queued:     {}", self.jobs_queued);
        println!("Jobs attempted:  {}", self.jobs_attempted);
        println!("Jobs succeeded:  {}", self.jobs_succeeded);
        println!("Bytes:           {}", humansize::format_size(self.bytes_transferred, humansize::BINARY));
        println!("Duration:        {:.2?}", self.duration);
        println!("Throughput:      {}/s", humansize::format_size(self.throughput() as u64, humansize::BINARY));

        if self.cancelled {
            println!("\nRun was cancelled; unclaimed jobs were skipped.");
        }

        if !self.interrupted.is_empty() {
            println!("\nInterrupted (possibly incomplete): {}", self.interrupted.len());
            for path in &self.interrupted {
                println!("  {}", path.display());
            }
        }

        if !self.failures.is_empty() {
            println!("\nFailures: {}", self.failures.len());
            for failure in &self.failures {
                println!("  {} - {}", failure.destination.display(), failure.error);
            }
        }
    }

    fn absorb(&mut self, tally: WorkerTally) {
        self.jobs_attempted += tally.attempted;
        self.jobs_succeeded += tally.succeeded;
        self.bytes_transferred += tally.bytes;
        self.failures.extend(tally.failures);
        self.interrupted.extend(tally.interrupted);
    }
}

/// What one worker did before stopping
#[derive(Debug, Default)]
struct WorkerTally {
    attempted: u64,
    succeeded: u64,
    bytes: u64,
    failures: Vec<JobFailure>,
    interrupted: Vec<PathBuf>,
}

/// Fixed-size pool of worker threads
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// Create a pool of `workers` threads (at least one)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Number of workers started per run
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Drain `source` with every worker running `work`, then join them all
    ///
    /// Per-job errors and panics are recorded in the summary; they never
    /// stop the pool.
    pub fn run<J, S, F>(
        &self,
        source: &S,
        cancel: &CancellationToken,
        progress: Option<&ProgressReporter>,
        work: F,
    ) -> Result<RunSummary>
    where
        J: PoolJob,
        S: JobSource<J> + ?Sized,
        F: Fn(&J, &CancellationToken) -> Result<u64> + Sync,
    {
        let start = Instant::now();
        let work = &work;

        tracing::info!(
            workers = self.workers,
            queued = ?source.len_hint(),
            "starting worker pool"
        );

        let tallies = thread::scope(|scope| -> Result<Vec<WorkerTally>> {
            let mut handles = Vec::with_capacity(self.workers);
            for worker_id in 0..self.workers {
                let handle = thread::Builder::new()
                    .name(format!("filework-worker-{}", worker_id))
                    .spawn_scoped(scope, move || worker_loop(worker_id, source, cancel, progress, work))
                    .map_err(|e| {
                        // Stop the workers already started before reporting.
                        cancel.cancel();
                        FileWorkError::WorkerPoolError(format!("failed to spawn worker {}: {}", worker_id, e))
                    })?;
                handles.push(handle);
            }

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| FileWorkError::WorkerPoolError("worker thread panicked".to_string()))
                })
                .collect()
        })?;

        let mut summary = RunSummary {
            workers: self.workers,
            ..Default::default()
        };
        for tally in tallies {
            summary.absorb(tally);
        }
        summary.jobs_queued = source
            .len_hint()
            .unwrap_or(summary.jobs_attempted as usize);
        summary.cancelled = cancel.is_cancelled();
        summary.duration = start.elapsed();

        tracing::info!(
            attempted = summary.jobs_attempted,
            succeeded = summary.jobs_succeeded,
            failed = summary.failures.len(),
            cancelled = summary.cancelled,
            "worker pool finished"
        );

        Ok(summary)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONCURRENT_WORKERS)
    }
}

fn worker_loop<J, S, F>(
    worker_id: usize,
    source: &S,
    cancel: &CancellationToken,
    progress: Option<&ProgressReporter>,
    work: &F,
) -> WorkerTally
where
    J: PoolJob,
    S: JobSource<J> + ?Sized,
    F: Fn(&J, &CancellationToken) -> Result<u64> + Sync,
{
    let mut tally = WorkerTally::default();

    while !cancel.is_cancelled() {
        let Some(job) = source.claim(cancel) else {
            break;
        };
        tally.attempted += 1;
        tracing::debug!(worker = worker_id, "processing {}", job);

        let mut bytes = 0;
        match panic::catch_unwind(AssertUnwindSafe(|| work(&job, cancel))) {
            Ok(Ok(written)) => {
                bytes = written;
                tally.succeeded += 1;
                tally.bytes += written;
            }
            Ok(Err(FileWorkError::Cancelled)) => {
                tracing::debug!(worker = worker_id, "interrupted {}", job);
                tally.interrupted.push(job.destination().to_path_buf());
            }
            Ok(Err(error)) => {
                tracing::warn!(worker = worker_id, "job {} failed: {}", job, error);
                tally.failures.push(JobFailure {
                    destination: job.destination().to_path_buf(),
                    error,
                });
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(worker = worker_id, "job {} panicked: {}", job, message);
                tally.failures.push(JobFailure {
                    destination: job.destination().to_path_buf(),
                    error: FileWorkError::WorkerPanic {
                        path: job.destination().to_path_buf(),
                        message,
                    },
                });
            }
        }

        if let Some(progress) = progress {
            progress.job_finished(bytes);
        }
    }

    tracing::debug!(worker = worker_id, attempted = tally.attempted, "worker stopping");
    tally
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
