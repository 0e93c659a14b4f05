//! Native byte-exact segmentation

use super::traits::Splitter;
use super::{enumerate_parts, expected_parts, remove_stale_parts};
use crate::error::PartitionError;
use crate::types::{Artifact, PartSet};
use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Splitter that cuts the file itself into `<name>.001`, `<name>.002`, ...
///
/// Concatenating the parts in order reproduces the source byte for byte
/// (`cat movie.mkv.* > movie.mkv`), so the receiving side needs no archiver.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawSplitter;

#[async_trait]
impl Splitter for RawSplitter {
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

        let base = artifact.file_name();
        remove_stale_parts(output_dir, &base, &artifact.path).await?;

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PartitionError::Io { path, source }
        };

        let mut source = tokio::fs::File::open(&artifact.path)
            .await
            .map_err(io_err(&artifact.path))?;
        let size = source
            .metadata()
            .await
            .map_err(io_err(&artifact.path))?
            .len();
        let count = expected_parts(size, part_size);

        debug!(
            path = ?artifact.path,
            size,
            part_size,
            count,
            "segmenting file"
        );

        for index in 1..=count {
            let part_path = output_dir.join(format!("{base}.{index:03}"));
            let mut part = tokio::fs::File::create(&part_path)
                .await
                .map_err(io_err(&part_path))?;
            let mut chunk = (&mut source).take(part_size);
            tokio::io::copy(&mut chunk, &mut part)
                .await
                .map_err(io_err(&part_path))?;
            part.flush().await.map_err(io_err(&part_path))?;
            part.sync_all().await.map_err(io_err(&part_path))?;
        }

        let parts = enumerate_parts(output_dir, &base).await?;
        info!(source = %base, parts = parts.len(), "file segmented");

        Ok(PartSet {
            source_name: base,
            parts,
        })
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}
