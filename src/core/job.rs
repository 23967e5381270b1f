//! Copy and merge job records
//!
//! Both records are immutable values. Paths are compared case-insensitively
//! wherever jobs are sorted or grouped, so concatenation order does not
//! depend on how the filesystem happened to enumerate entries.

use crate::error::{FileWorkError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Compare two paths ignoring letter case
pub fn compare_paths_ignore_case(left: &Path, right: &Path) -> Ordering {
    let left = left.to_string_lossy();
    let right = right.to_string_lossy();
    left.chars()
        .flat_map(char::to_lowercase)
        .cmp(right.chars().flat_map(char::to_lowercase))
}

/// Are two paths equal when letter case is ignored?
pub fn paths_equal_ignore_case(left: &Path, right: &Path) -> bool {
    compare_paths_ignore_case(left, right) == Ordering::Equal
}

/// One source file to be written to one destination file
///
/// Ordered by destination, then source, both ignoring case. Equality is
/// exact on both fields; the exact comparison is also the final ordering
/// tie-break, so two jobs differing only in case never collapse in a set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopyJob {
    source: PathBuf,
    destination: PathBuf,
}

impl CopyJob {
    /// Create a new job
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// File to read
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// File to write
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Does this job write to the same file as `other`?
    pub fn same_destination(&self, other: &CopyJob) -> bool {
        paths_equal_ignore_case(&self.destination, &other.destination)
    }
}

impl Ord for CopyJob {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_paths_ignore_case(&self.destination, &other.destination)
            .then_with(|| compare_paths_ignore_case(&self.source, &other.source))
            .then_with(|| self.destination.cmp(&other.destination))
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl PartialOrd for CopyJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CopyJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' -> '{}'", self.source.display(), self.destination.display())
    }
}

/// Several source files concatenated, in order, into one destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeJob {
    destination: PathBuf,
    sources: Vec<PathBuf>,
}

impl MergeJob {
    /// Create a merge job; at least one source is required
    pub fn new(destination: impl Into<PathBuf>, sources: Vec<PathBuf>) -> Result<Self> {
        let destination = destination.into();
        if sources.is_empty() {
            return Err(FileWorkError::EmptyMergeJob(destination));
        }
        Ok(Self {
            destination,
            sources,
        })
    }

    /// Build a merge job from a run of copy jobs sharing one destination
    ///
    /// The destination of the first job is used; sources keep slice order.
    pub fn from_group(group: &[CopyJob]) -> Result<Self> {
        let first = group
            .first()
            .ok_or_else(|| FileWorkError::EmptyMergeJob(PathBuf::new()))?;
        debug_assert!(group.iter().all(|job| job.same_destination(first)));

        Self::new(
            first.destination.clone(),
            group.iter().map(|job| job.source.clone()).collect(),
        )
    }

    /// File to write
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Files to concatenate, in output order
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

impl PartialEq for MergeJob {
    fn eq(&self, other: &Self) -> bool {
        if self.sources.len() != other.sources.len()
            || !paths_equal_ignore_case(&self.destination, &other.destination)
        {
            return false;
        }
        let ours: BTreeSet<&PathBuf> = self.sources.iter().collect();
        let theirs: BTreeSet<&PathBuf> = other.sources.iter().collect();
        ours == theirs
    }
}

impl Eq for MergeJob {}

impl fmt::Display for MergeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} file(s) -> '{}'", self.sources.len(), self.destination.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_copy_job_orders_by_destination_first() {
        let a = CopyJob::new("/z/source", "/out/a");
        let b = CopyJob::new("/a/source", "/out/b");
        assert!(a < b);
    }

    #[test]
    fn test_copy_job_orders_ignoring_case() {
        let upper = CopyJob::new("/src/x", "/OUT/Alpha");
        let lower = CopyJob::new("/src/x", "/out/beta");
        assert!(upper < lower);

        let first = CopyJob::new("/src/A.txt", "/out/merged");
        let second = CopyJob::new("/src/b.txt", "/out/merged");
        assert!(first < second);
    }

    #[test]
    fn test_copy_job_equality_is_exact() {
        let a = CopyJob::new("/src/a", "/out/file");
        let b = CopyJob::new("/src/a", "/OUT/file");
        assert_ne!(a, b);
        assert!(a.same_destination(&b));

        let set: BTreeSet<CopyJob> = [a.clone(), b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_merge_job_requires_source() {
        assert!(matches!(
            MergeJob::new("/out", Vec::new()),
            Err(FileWorkError::EmptyMergeJob(_))
        ));
        assert!(MergeJob::from_group(&[]).is_err());
    }

    #[test]
    fn test_merge_job_equality_ignores_source_order() {
        let a = MergeJob::new("/out/File", vec!["/a".into(), "/b".into()]).unwrap();
        let b = MergeJob::new("/OUT/file", vec!["/b".into(), "/a".into()]).unwrap();
        let c = MergeJob::new("/out/file", vec!["/a".into(), "/c".into()]).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_merge_job_equality_counts_repeated_sources() {
        let twice = MergeJob::new("/out", vec!["/a".into(), "/a".into()]).unwrap();
        let once = MergeJob::new("/out", vec!["/a".into()]).unwrap();

        assert_ne!(twice, once);
        assert_ne!(once, twice);
        assert_eq!(twice, twice.clone());
    }

    #[test]
    fn test_merge_job_from_group_keeps_order() {
        let group = vec![
            CopyJob::new("/src/1", "/out/m"),
            CopyJob::new("/src/2", "/out/m"),
        ];
        let job = MergeJob::from_group(&group).unwrap();

        assert_eq!(job.destination(), Path::new("/out/m"));
        assert_eq!(job.sources(), &[PathBuf::from("/src/1"), PathBuf::from("/src/2")]);
    }
}
