use super::{collect_files, failed, is_safe_entry};
use crate::error::ExtractionError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extract a 7z archive with `sevenz-rust`
pub(super) fn extract(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    debug!(?archive_path, ?dest, "extracting 7z archive");

    sevenz_rust::decompress_file_with_extract_fn(archive_path, dest, |entry, reader, target| {
        if !is_safe_entry(entry.name()) {
            warn!(entry = entry.name(), "skipping entry with unsafe path");
            // solid blocks decode sequentially, so the entry's bytes must still be consumed
            std::io::copy(reader, &mut std::io::sink())?;
            return Ok(true);
        }
        sevenz_rust::default_entry_extract_fn(entry, reader, target)
    })
    .map_err(|e| failed(archive_path, format!("failed to extract 7z archive: {e}")))?;

    collect_files(dest).map_err(|e| failed(archive_path, e.to_string()))
}
