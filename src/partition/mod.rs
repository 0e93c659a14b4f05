//! Splitting files that exceed the transport ceiling
//!
//! [`needs_split`] is the pure size check the scheduler branches on. The
//! [`Splitter`] trait has two implementations:
//!
//! - [`SevenZipSplitter`]: store-only (`-mx0`) multi-volume 7z archive,
//!   producing `<stem>.7z.001`, `.002`, ...
//! - [`RawSplitter`]: native byte-exact segmentation producing
//!   `<name>.001`, `.002`, ... with no external tool
//!
//! Both enumerate their output with [`enumerate_parts`], which orders volumes
//! by the numeric value of their suffix so `.1000` follows `.999`.

mod raw;
mod sevenzip;
mod traits;

pub use raw::RawSplitter;
pub use sevenzip::SevenZipSplitter;
pub use traits::Splitter;

use crate::error::PartitionError;
use crate::types::Artifact;
use std::path::Path;

/// Volume suffixes are at least this many digits (`.001`)
const MIN_SUFFIX_DIGITS: usize = 3;

/// Whether `artifact` is too large for one transport message
#[must_use]
pub fn needs_split(artifact: &Artifact, ceiling: u64) -> bool {
    artifact.size > ceiling
}

/// Number of parts a store-only segmentation of `size` bytes yields
#[must_use]
pub fn expected_parts(size: u64, part_size: u64) -> u64 {
    if part_size == 0 {
        return 0;
    }
    size.div_ceil(part_size)
}

/// Parse the volume number of `file_name` if it is `<base>.<digits>`
pub(crate) fn volume_number(file_name: &str, base: &str) -> Option<u32> {
    let suffix = file_name.strip_prefix(base)?.strip_prefix('.')?;
    if suffix.len() < MIN_SUFFIX_DIGITS || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// List the volumes of `base` in `dir`, ordered 1..N.
///
/// # Errors
///
/// [`PartitionError::NoParts`] when no volume exists,
/// [`PartitionError::NonContiguous`] when numbering does not run 1, 2, ... N.
pub async fn enumerate_parts(dir: &Path, base: &str) -> Result<Vec<Artifact>, PartitionError> {
    let io_err = |source| PartitionError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut listing = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut volumes = Vec::new();
    while let Some(entry) = listing.next_entry().await.map_err(io_err)? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(n) = volume_number(name, base) {
            volumes.push((n, entry.path()));
        }
    }

    if volumes.is_empty() {
        return Err(PartitionError::NoParts {
            base: base.to_string(),
        });
    }

    volumes.sort_by_key(|(n, _)| *n);
    for (expected, (n, _)) in (1u32..).zip(volumes.iter()) {
        if *n != expected {
            return Err(PartitionError::NonContiguous {
                base: base.to_string(),
                missing: expected,
            });
        }
    }

    let mut parts = Vec::with_capacity(volumes.len());
    for (_, path) in volumes {
        let part = Artifact::from_path(&path)
            .await
            .map_err(|source| PartitionError::Io { path, source })?;
        parts.push(part);
    }
    Ok(parts)
}

/// Delete leftover volumes of `base` from an earlier run.
///
/// A bare `<base>` file is removed too, unless it is `source` itself.
pub(crate) async fn remove_stale_parts(
    dir: &Path,
    base: &str,
    source: &Path,
) -> Result<(), PartitionError> {
    let mut listing = match tokio::fs::read_dir(dir).await {
        Ok(listing) => listing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(PartitionError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };
    let source = tokio::fs::canonicalize(source)
        .await
        .unwrap_or_else(|_| source.to_path_buf());

    while let Ok(Some(entry)) = listing.next_entry().await {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if volume_number(&name, base).is_none() && name != base {
            continue;
        }
        let path = entry.path();
        let resolved = tokio::fs::canonicalize(&path)
            .await
            .unwrap_or_else(|_| path.clone());
        if resolved == source {
            continue;
        }
        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| PartitionError::Io { path, source })?;
    }
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::fake_artifact;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn needs_split_only_above_ceiling() {
        let ceiling = 2000;
        assert!(!needs_split(&fake_artifact(PathBuf::from("a"), 500), ceiling));
        assert!(!needs_split(&fake_artifact(PathBuf::from("a"), 2000), ceiling));
        assert!(needs_split(&fake_artifact(PathBuf::from("a"), 2001), ceiling));
    }

    #[test]
    fn expected_parts_rounds_up() {
        assert_eq!(expected_parts(5000, 1900), 3);
        assert_eq!(expected_parts(3800, 1900), 2);
        assert_eq!(expected_parts(1, 1900), 1);
        assert_eq!(expected_parts(0, 1900), 0);
        assert_eq!(expected_parts(10, 0), 0);
    }

    #[test]
    fn volume_number_requires_base_and_digit_suffix() {
        assert_eq!(volume_number("movie.7z.001", "movie.7z"), Some(1));
        assert_eq!(volume_number("movie.7z.1000", "movie.7z"), Some(1000));
        assert_eq!(volume_number("movie.7z.01", "movie.7z"), None);
        assert_eq!(volume_number("movie.7z.tmp", "movie.7z"), None);
        assert_eq!(volume_number("other.7z.001", "movie.7z"), None);
        assert_eq!(volume_number("movie.7z", "movie.7z"), None);
    }

    #[tokio::test]
    async fn parts_are_ordered_numerically_past_999() {
        let dir = TempDir::new().unwrap();
        for n in [1000u32, 2, 999, 1] {
            std::fs::write(dir.path().join(format!("big.7z.{n:03}")), b"x").unwrap();
        }
        // fill the gap so numbering is contiguous
        for n in 3..999u32 {
            std::fs::write(dir.path().join(format!("big.7z.{n:03}")), b"x").unwrap();
        }

        let parts = enumerate_parts(dir.path(), "big.7z").await.unwrap();
        assert_eq!(parts.len(), 1000);
        assert_eq!(parts[0].file_name(), "big.7z.001");
        assert_eq!(parts[998].file_name(), "big.7z.999");
        assert_eq!(parts[999].file_name(), "big.7z.1000");
    }

    #[tokio::test]
    async fn unrelated_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("movie.mkv"), b"src").unwrap();
        std::fs::write(dir.path().join("movie.7z.001"), b"a").unwrap();
        std::fs::write(dir.path().join("movie.7z.002"), b"b").unwrap();
        std::fs::write(dir.path().join("other.7z.001"), b"c").unwrap();

        let parts = enumerate_parts(dir.path(), "movie.7z").await.unwrap();
        let names: Vec<_> = parts.iter().map(|p| p.file_name()).collect();
        assert_eq!(names, ["movie.7z.001", "movie.7z.002"]);
    }

    #[tokio::test]
    async fn empty_listing_is_no_parts() {
        let dir = TempDir::new().unwrap();
        let err = enumerate_parts(dir.path(), "movie.7z").await.unwrap_err();
        assert!(matches!(err, PartitionError::NoParts { .. }));
    }

    #[tokio::test]
    async fn gap_in_numbering_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("movie.7z.001"), b"a").unwrap();
        std::fs::write(dir.path().join("movie.7z.003"), b"c").unwrap();

        match enumerate_parts(dir.path(), "movie.7z").await.unwrap_err() {
            PartitionError::NonContiguous { missing, .. } => assert_eq!(missing, 2),
            other => panic!("expected NonContiguous, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_parts_are_removed_but_source_kept() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("movie.mkv"), b"src").unwrap();
        std::fs::write(dir.path().join("movie.7z"), b"x").unwrap();
        std::fs::write(dir.path().join("movie.7z.001"), b"x").unwrap();

        remove_stale_parts(dir.path(), "movie.7z", &dir.path().join("movie.mkv"))
            .await
            .unwrap();
        assert!(dir.path().join("movie.mkv").exists());
        assert!(!dir.path().join("movie.7z").exists());
        assert!(!dir.path().join("movie.7z.001").exists());
    }

    #[tokio::test]
    async fn source_named_like_the_base_survives_cleanup() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("movie.mkv"), b"src").unwrap();
        std::fs::write(dir.path().join("movie.mkv.001"), b"old").unwrap();
        std::fs::write(dir.path().join("movie.mkv.002"), b"old").unwrap();

        remove_stale_parts(dir.path(), "movie.mkv", &dir.path().join("movie.mkv"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(dir.path().join("movie.mkv")).unwrap(), b"src");
        assert!(!dir.path().join("movie.mkv.001").exists());
        assert!(!dir.path().join("movie.mkv.002").exists());
    }
}
