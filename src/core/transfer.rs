//! Per-job transfer routines run by the workers
//!
//! Each call allocates one transfer buffer for the job and drops every
//! handle before returning.

use crate::core::{CancellationToken, CopyJob, MergeJob};
use crate::error::{FileWorkError, IoResultExt, Result};
use crate::fs::{self, StreamCopy};
use std::io::Write;

/// Stream one source file into its destination, replacing any content
///
/// Returns the number of bytes written, or [`FileWorkError::Cancelled`]
/// when cancellation stops the copy part-way. A source that resolves to
/// the destination fails with [`FileWorkError::SameFile`] before anything
/// is written.
pub fn copy_file(job: &CopyJob, buffer_size: usize, cancel: &CancellationToken) -> Result<u64> {
    let mut reader = fs::open_reader(job.source(), buffer_size)?;
    // Truncating the destination would erase the source before it is read.
    if fs::same_file(job.source(), job.destination()) {
        return Err(FileWorkError::SameFile(job.destination().to_path_buf()));
    }
    let mut writer = fs::open_truncating_writer(job.destination(), buffer_size)?;
    let mut buffer = vec![0u8; buffer_size.max(1)];

    let outcome = fs::copy_stream(
        &mut reader,
        &mut writer,
        &mut buffer,
        job.source(),
        job.destination(),
        || cancel.is_cancelled(),
    )?;
    writer.flush().with_path(job.destination())?;

    match outcome {
        StreamCopy::Completed(bytes) => {
            tracing::trace!(bytes, "copied {}", job);
            Ok(bytes)
        }
        StreamCopy::Cancelled(_) => Err(FileWorkError::Cancelled),
    }
}

/// Concatenate every source of `job`, in order, onto its destination
///
/// With `clean_output` the destination is deleted first; otherwise the
/// sources are appended after whatever the destination already holds.
/// A source that is the destination itself fails the whole job up front.
pub fn merge_files(
    job: &MergeJob,
    buffer_size: usize,
    clean_output: bool,
    cancel: &CancellationToken,
) -> Result<u64> {
    if let Some(source) = job
        .sources()
        .iter()
        .find(|source| fs::same_file(source, job.destination()))
    {
        return Err(FileWorkError::SameFile(source.clone()));
    }

    if clean_output && fs::remove_file_if_exists(job.destination())? {
        tracing::debug!("removed previous output {}", job.destination().display());
    }

    let mut writer = fs::open_appending_writer(job.destination(), buffer_size)?;
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;

    for source in job.sources() {
        let mut reader = fs::open_reader(source, buffer_size)?;
        let outcome = fs::copy_stream(
            &mut reader,
            &mut writer,
            &mut buffer,
            source,
            job.destination(),
            || cancel.is_cancelled(),
        )?;
        total += outcome.bytes();

        if let StreamCopy::Cancelled(_) = outcome {
            writer.flush().with_path(job.destination())?;
            return Err(FileWorkError::Cancelled);
        }
    }

    writer.flush().with_path(job.destination())?;
    tracing::trace!(bytes = total, "merged {}", job);
    Ok(total)
}
