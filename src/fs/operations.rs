//! Stream handles and byte transfer
//!
//! Readers share read access, writers take the file exclusively. Handles
//! are plain RAII values, so they are closed on every exit path, including
//! errors and cancellation.

use crate::error::{FileWorkError, IoResultExt, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

#[cfg(windows)]
const FILE_SHARE_NONE: u32 = 0x0;
#[cfg(windows)]
const FILE_SHARE_READ: u32 = 0x1;

/// Outcome of a stream copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCopy {
    /// Source drained completely
    Completed(u64),
    /// Stopped early because cancellation was observed
    Cancelled(u64),
}

impl StreamCopy {
    /// Bytes written before the copy stopped
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Completed(bytes) | Self::Cancelled(bytes) => *bytes,
        }
    }
}

/// Open `path` for buffered reading with shared read access
pub fn open_reader(path: &Path, buffer_size: usize) -> Result<BufReader<File>> {
    let mut options = OpenOptions::new();
    options.read(true);

    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(FILE_SHARE_READ);
    }

    let file = options.open(path).with_path(path)?;
    Ok(BufReader::with_capacity(buffer_size.max(1), file))
}

/// Open `path` for writing, creating it or truncating existing content
pub fn open_truncating_writer(path: &Path, buffer_size: usize) -> Result<BufWriter<File>> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    open_writer(path, buffer_size, options)
}

/// Open `path` for writing at its end, creating it if missing
pub fn open_appending_writer(path: &Path, buffer_size: usize) -> Result<BufWriter<File>> {
    let mut options = OpenOptions::new();
    options.append(true).create(true);
    open_writer(path, buffer_size, options)
}

#[allow(unused_mut)]
fn open_writer(path: &Path, buffer_size: usize, mut options: OpenOptions) -> Result<BufWriter<File>> {
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(FILE_SHARE_NONE);
    }

    let file = options.open(path).with_path(path)?;
    Ok(BufWriter::with_capacity(buffer_size.max(1), file))
}

/// Copy `reader` into `writer` through `buffer`
///
/// `is_cancelled` is polled before every chunk. The writer is not flushed
/// here; callers flush once the whole job is done.
pub fn copy_stream<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut [u8],
    source: &Path,
    dest: &Path,
    is_cancelled: F,
) -> Result<StreamCopy>
where
    R: Read,
    W: Write,
    F: Fn() -> bool,
{
    let mut total = 0u64;

    loop {
        if is_cancelled() {
            return Ok(StreamCopy::Cancelled(total));
        }

        let read = match reader.read(buffer) {
            Ok(0) => return Ok(StreamCopy::Completed(total)),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(FileWorkError::io(source, e)),
        };

        writer.write_all(&buffer[..read]).with_path(dest)?;
        total += read as u64;
    }
}

/// Create `path` and any missing parents; existing directories are fine
pub fn ensure_directory(path: &Path) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    std::fs::create_dir_all(path).with_path(path)?;
    Ok(true)
}

/// Delete the file at `path` if there is one
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FileWorkError::io(path, e)),
    }
}
