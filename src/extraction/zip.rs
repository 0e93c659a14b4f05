use super::{collect_files, failed};
use crate::error::ExtractionError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extract a ZIP archive with the `zip` crate
pub(super) fn extract(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    debug!(?archive_path, ?dest, "extracting ZIP archive");

    let file = std::fs::File::open(archive_path)
        .map_err(|e| failed(archive_path, format!("cannot open archive: {e}")))?;
    let mut archive = ::zip::ZipArchive::new(file)
        .map_err(|e| failed(archive_path, format!("failed to read ZIP archive: {e}")))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| failed(archive_path, format!("failed to read ZIP entry: {e}")))?;

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = entry.name(), "skipping entry with unsafe path");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| failed(archive_path, format!("cannot create directory: {e}")))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| failed(archive_path, format!("cannot create directory: {e}")))?;
        }
        let mut out = std::fs::File::create(&target)
            .map_err(|e| failed(archive_path, format!("cannot create output file: {e}")))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| failed(archive_path, format!("failed to extract {}: {e}", entry.name())))?;
    }

    collect_files(dest).map_err(|e| failed(archive_path, e.to_string()))
}
