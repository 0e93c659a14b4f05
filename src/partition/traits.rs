//! Splitter trait

use crate::error::PartitionError;
use crate::types::{Artifact, PartSet};
use async_trait::async_trait;
use std::path::Path;

/// Cuts one artifact into ordered parts of bounded size
#[async_trait]
pub trait Splitter: Send + Sync {
    /// Split `artifact` into parts of at most `part_size` bytes inside `output_dir`
    ///
    /// The source file is left in place; deleting it is the caller's call.
    ///
    /// # Errors
    ///
    /// - [`PartitionError::Spawn`] / [`PartitionError::ToolFailed`] when an
    ///   external archiver cannot run or exits non-zero
    /// - [`PartitionError::NoParts`] when nothing was produced
    /// - [`PartitionError::NonContiguous`] when volume numbering has a gap
    async fn split(
        &self,
        artifact: &Artifact,
        part_size: u64,
        output_dir: &Path,
    ) -> Result<PartSet, PartitionError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
