//! Archive extraction for documents users send to the bot
//!
//! [`classify`] maps a file name to an [`ArchiveKind`] without touching the
//! disk. [`Extractor::extract`] dispatches on the kind:
//!
//! | Kind                     | Decoder                          |
//! |--------------------------|----------------------------------|
//! | `Zip`                    | `zip` crate                      |
//! | `SevenZip`               | `sevenz-rust`                    |
//! | `Rar`                    | `unrar`                          |
//! | `Tar`, `Gzip`, `Bzip2`   | external `7z x`                  |
//!
//! Entries whose path is absolute or climbs out with `..` are skipped.
//! The in-process decoders are blocking and run under `spawn_blocking`.

mod external;
mod rar;
mod sevenz;
mod zip;

use crate::error::ExtractionError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// Archive formats the bot can unpack
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// `.zip`
    Zip,
    /// `.7z`
    SevenZip,
    /// `.rar`
    Rar,
    /// `.tar`
    Tar,
    /// `.gz`, `.tgz`, `.tar.gz`
    Gzip,
    /// `.bz2`, `.tbz2`, `.tar.bz2`
    Bzip2,
}

/// Classify `file_name` by extension (case-insensitive)
pub fn classify(file_name: &str) -> Option<ArchiveKind> {
    let lower = file_name.to_ascii_lowercase();
    let kind = if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") || lower.ends_with(".gz")
    {
        ArchiveKind::Gzip
    } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") || lower.ends_with(".bz2")
    {
        ArchiveKind::Bzip2
    } else if lower.ends_with(".tar") {
        ArchiveKind::Tar
    } else if lower.ends_with(".zip") {
        ArchiveKind::Zip
    } else if lower.ends_with(".7z") {
        ArchiveKind::SevenZip
    } else if lower.ends_with(".rar") {
        ArchiveKind::Rar
    } else {
        return None;
    };
    Some(kind)
}

/// Whether an archive entry name stays inside the destination
pub(crate) fn is_safe_entry(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && !name.starts_with('/')
        && !name.starts_with('\\')
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Dispatches archives to the matching decoder
#[derive(Clone, Debug)]
pub struct Extractor {
    sevenzip_path: Option<PathBuf>,
}

impl Extractor {
    /// `sevenzip_path` is the `7z` binary used for tar/gz/bz2; `None` looks it up in PATH
    pub fn new(sevenzip_path: Option<PathBuf>) -> Self {
        Self { sevenzip_path }
    }

    /// Unpack `archive` into `dest` and return the extracted regular files
    pub async fn extract(
        &self,
        kind: ArchiveKind,
        archive: &Path,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, ExtractionError> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| failed(archive, format!("cannot create {}: {e}", dest.display())))?;

        let files = match kind {
            ArchiveKind::Zip => blocking(archive, dest, zip::extract).await?,
            ArchiveKind::SevenZip => blocking(archive, dest, sevenz::extract).await?,
            ArchiveKind::Rar => blocking(archive, dest, rar::extract).await?,
            ArchiveKind::Tar | ArchiveKind::Gzip | ArchiveKind::Bzip2 => {
                let binary = self.sevenzip_binary(archive)?;
                external::extract(&binary, kind, archive, dest).await?
            }
        };

        info!(
            ?archive,
            ?kind,
            extracted = files.len(),
            "archive extracted"
        );
        Ok(files)
    }

    /// Classify by file name, then extract
    pub async fn extract_by_name(
        &self,
        archive: &Path,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, ExtractionError> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = classify(&name).ok_or(ExtractionError::Unsupported { name })?;
        self.extract(kind, archive, dest).await
    }

    fn sevenzip_binary(&self, archive: &Path) -> Result<PathBuf, ExtractionError> {
        if let Some(path) = &self.sevenzip_path {
            return Ok(path.clone());
        }
        which::which("7z")
            .or_else(|_| which::which("7za"))
            .map_err(|_| failed(archive, "7z not found in PATH".to_string()))
    }
}

async fn blocking(
    archive: &Path,
    dest: &Path,
    decode: fn(&Path, &Path) -> Result<Vec<PathBuf>, ExtractionError>,
) -> Result<Vec<PathBuf>, ExtractionError> {
    let (a, d) = (archive.to_path_buf(), dest.to_path_buf());
    tokio::task::spawn_blocking(move || decode(&a, &d))
        .await
        .map_err(|e| failed(archive, format!("decoder task panicked: {e}")))?
}

pub(crate) fn failed(archive: &Path, reason: String) -> ExtractionError {
    ExtractionError::Failed {
        archive: archive.to_path_buf(),
        reason,
    }
}

/// Every regular file under `dir` that resolves inside it, sorted by path
pub(crate) fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    fn visit(dir: &Path, root: &Path, files: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_symlink() {
                warn!(?path, "skipping symlink in extracted output");
                continue;
            }
            if file_type.is_dir() {
                visit(&path, root, files)?;
            } else if file_type.is_file() {
                match path.canonicalize() {
                    Ok(resolved) if resolved.starts_with(root) => files.push(resolved),
                    _ => warn!(?path, "skipping file outside destination"),
                }
            }
        }
        Ok(())
    }

    let root = dir.canonicalize()?;
    let mut files = Vec::new();
    visit(&root, &root, &mut files)?;
    files.sort();
    Ok(files)
}
