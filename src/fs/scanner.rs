//! Directory enumeration and metadata queries
//!
//! Recursive walks skip entries that cannot be read instead of failing the
//! whole walk. Timestamps are reported as `Option<SystemTime>` so a missing
//! file sorts before every real modification time.

use crate::error::{FileWorkError, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

/// What kind of entry a walk should yield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Directory,
    File,
}

/// Walk everything below `root` (the root itself excluded), keeping one kind
fn walk(root: &Path, kind: EntryKind) -> impl Iterator<Item = PathBuf> + '_ {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!(root = %root.display(), "skipping inaccessible entry: {}", err);
                None
            }
        })
        .filter(move |e| matches_kind(e, kind))
        .map(DirEntry::into_path)
}

/// Symlinked directories are never descended into; a symlink to a regular
/// file counts as a file and is read through the link.
fn matches_kind(entry: &DirEntry, kind: EntryKind) -> bool {
    let file_type = entry.file_type();
    match kind {
        EntryKind::Directory => file_type.is_dir(),
        EntryKind::File => {
            file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
        }
    }
}

/// Recursively list every directory below `root`
pub fn list_directories(root: &Path) -> Vec<PathBuf> {
    walk(root, EntryKind::Directory).collect()
}

/// Recursively list every regular file below `root`
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    walk_files(root).collect()
}

/// Lazily walk every regular file below `root`
pub fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    walk(root, EntryKind::File)
}

/// Count the files a recursive walk of `dir` can reach
pub fn count_accessible_files(dir: &Path) -> Result<usize> {
    if !is_existing_dir(dir) {
        return Err(FileWorkError::SourceNotFound(dir.to_path_buf()));
    }
    Ok(walk_files(dir).count())
}

/// Last-write time of `path`, or `None` when it cannot be read
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Does `path` name an existing regular file?
pub fn is_existing_file(path: &Path) -> bool {
    path.is_file()
}

/// Does `path` name an existing directory?
pub fn is_existing_dir(path: &Path) -> bool {
    path.is_dir()
}

/// Do both paths resolve to the same existing file?
pub fn same_file(left: &Path, right: &Path) -> bool {
    match (left.canonicalize(), right.canonicalize()) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

/// Re-root `path` from under `source_root` to under `dest_root`
pub fn rebase(path: &Path, source_root: &Path, dest_root: &Path) -> PathBuf {
    match path.strip_prefix(source_root) {
        Ok(relative) => dest_root.join(relative),
        Err(_) => dest_root.join(path.file_name().unwrap_or(path.as_os_str())),
    }
}
