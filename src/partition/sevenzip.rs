//! Multi-volume 7z archives through the external `7z` binary

use super::traits::Splitter;
use super::{enumerate_parts, remove_stale_parts};
use crate::error::PartitionError;
use crate::types::{Artifact, PartSet};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Splitter that packs a file into store-only 7z volumes
///
/// Produces `<stem>.7z.001`, `<stem>.7z.002`, ... in the output directory.
/// Volumes are extracted on the receiving side with any 7z-compatible tool
/// once all of them are present.
pub struct SevenZipSplitter {
    binary_path: PathBuf,
}

impl SevenZipSplitter {
    /// Create a splitter with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find 7z in PATH
    pub fn from_path() -> Option<Self> {
        which::which("7z")
            .or_else(|_| which::which("7za"))
            .ok()
            .map(Self::new)
    }

    /// Binary this splitter runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Archive base name for `artifact`: `<stem>.7z`, or `<name>.7z` when the
    /// source already carries a `.7z` extension so the archive never lands on it
    pub fn archive_name(artifact: &Artifact) -> String {
        let is_7z = artifact
            .path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("7z"));
        if is_7z {
            return format!("{}.7z", artifact.file_name());
        }
        let stem = artifact
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| artifact.file_name());
        format!("{stem}.7z")
    }

    /// Argument vector for one invocation
    pub fn build_args(archive: &Path, input: &Path, part_size: u64) -> Vec<OsString> {
        vec![
            "a".into(),
            format!("-v{part_size}b").into(),
            "-mx0".into(),
            "-y".into(),
            archive.as_os_str().to_owned(),
            input.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl Splitter for SevenZipSplitter {
    async fn split(
        &self,
        artifact: &Artifact,
        part_size: u64,
        output_dir: &Path,
    ) -> Result<PartSet, PartitionError> {
        if part_size == 0 {
            return Err(PartitionError::InvalidPartSize {
                part_size,
                ceiling: 0,
            });
        }

        let base = Self::archive_name(artifact);
        remove_stale_parts(output_dir, &base, &artifact.path).await?;

        let archive = output_dir.join(&base);
        let args = Self::build_args(&archive, &artifact.path, part_size);
        debug!(binary = ?self.binary_path, ?args, "running archiver");

        let output = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PartitionError::Spawn {
                tool: self.binary_path.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostic = format!("{}\n{}", stdout.trim(), stderr.trim())
                .trim()
                .to_string();
            warn!(
                archive = %base,
                status = %output.status,
                %diagnostic,
                "archiver failed"
            );
            return Err(PartitionError::ToolFailed {
                status: output.status.to_string(),
                diagnostic,
            });
        }

        let parts = enumerate_parts(output_dir, &base).await?;
        info!(
            source = %artifact.file_name(),
            archive = %base,
            parts = parts.len(),
            "archive volumes created"
        );

        Ok(PartSet {
            source_name: artifact.file_name(),
            parts,
        })
    }

    fn name(&self) -> &'static str {
        "7z"
    }
}
