//! Locating the file a downloader run produced

use crate::error::FetchError;
use crate::types::Artifact;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Extensions the downloader uses for unfinished files
const PARTIAL_EXTENSIONS: &[&str] = &["part", "ytdl", "temp"];

/// Modification times of the regular files in a directory
#[derive(Debug, Default, Clone)]
pub struct DirSnapshot {
    entries: HashMap<PathBuf, SystemTime>,
}

impl DirSnapshot {
    /// List `dir`; a missing directory yields an empty snapshot
    pub async fn take(dir: &Path) -> Self {
        let mut entries = HashMap::new();
        let Ok(mut listing) = tokio::fs::read_dir(dir).await else {
            return Self { entries };
        };
        while let Ok(Some(entry)) = listing.next_entry().await {
            if let Ok(meta) = entry.metadata().await
                && meta.is_file()
            {
                let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                entries.insert(entry.path(), mtime);
            }
        }
        Self { entries }
    }

    /// Whether `path` is absent from the snapshot or was modified since
    fn is_new(&self, path: &Path, modified: SystemTime) -> bool {
        match self.entries.get(path) {
            Some(before) => modified > *before,
            None => true,
        }
    }
}

struct Candidate {
    path: PathBuf,
    size: u64,
    created: SystemTime,
}

/// Pick the downloaded media file in `dir`.
///
/// Only regular files whose extension is in `media_extensions` count, and
/// unfinished downloads are ignored. Files that appeared or changed since
/// `before` win; among those the most recently created one is chosen. When
/// `allow_existing` is set (the tool reported the file was already present)
/// and nothing changed, the most recent media file overall is accepted.
pub async fn resolve_artifact(
    dir: &Path,
    before: &DirSnapshot,
    media_extensions: &[String],
    allow_existing: bool,
) -> Result<Artifact, FetchError> {
    let mut fresh: Vec<Candidate> = Vec::new();
    let mut existing: Vec<Candidate> = Vec::new();

    let mut listing = tokio::fs::read_dir(dir)
        .await
        .map_err(|_| FetchError::NoArtifact {
            dir: dir.to_path_buf(),
        })?;

    while let Ok(Some(entry)) = listing.next_entry().await {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if PARTIAL_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(ext))
            || !media_extensions.iter().any(|m| m.eq_ignore_ascii_case(ext))
        {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }

        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let candidate = Candidate {
            path: path.clone(),
            size: meta.len(),
            created: meta.created().unwrap_or(modified),
        };
        if before.is_new(&path, modified) {
            fresh.push(candidate);
        } else {
            existing.push(candidate);
        }
    }

    debug!(
        ?dir,
        fresh = fresh.len(),
        existing = existing.len(),
        "resolving downloaded artifact"
    );

    let pool = if fresh.is_empty() && allow_existing {
        existing
    } else {
        fresh
    };

    let chosen = pool
        .into_iter()
        .max_by_key(|c| c.created)
        .ok_or_else(|| FetchError::NoArtifact {
            dir: dir.to_path_buf(),
        })?;

    Ok(Artifact {
        path: chosen.path,
        size: chosen.size,
        created: DateTime::<Utc>::from(chosen.created),
    })
}
