use super::{collect_files, failed};
use crate::error::ExtractionError;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Extract a RAR archive with `unrar`
///
/// Walks the header state machine: each header is either extracted or
/// skipped, which returns the processor to the next header.
pub(super) fn extract(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    debug!(?archive_path, ?dest, "extracting RAR archive");

    let mut at_header = unrar::Archive::new(archive_path)
        .open_for_processing()
        .map_err(|e| failed(archive_path, e.to_string()))?;

    loop {
        let at_file = match at_header.read_header() {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(e) => return Err(failed(archive_path, e.to_string())),
        };
        let header = at_file.entry();

        let safe = header
            .filename
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe || header.filename.as_os_str().is_empty() {
            warn!(entry = ?header.filename, "skipping entry with unsafe path");
            at_header = at_file
                .skip()
                .map_err(|e| failed(archive_path, format!("failed to skip entry: {e}")))?;
            continue;
        }

        if header.is_directory() {
            at_header = at_file
                .skip()
                .map_err(|e| failed(archive_path, format!("failed to skip directory: {e}")))?;
        } else {
            let target = dest.join(&header.filename);
            at_header = at_file
                .extract_to(&target)
                .map_err(|e| failed(archive_path, e.to_string()))?;
        }
    }

    collect_files(dest).map_err(|e| failed(archive_path, e.to_string()))
}
