//! Per-principal scratch directories
//!
//! Every principal gets one directory under the configured root, named after
//! its id and reused across that principal's requests. A [`Workspace`] handle
//! holds the principal's gate for as long as it lives, so two requests from
//! the same principal never touch the directory at the same time while
//! requests from different principals run freely in parallel.
//!
//! A handle that is dropped without [`Workspace::purge`] or
//! [`Workspace::keep`] (early return, panic) purges the directory on drop.

use crate::error::WorkspaceError;
use crate::types::PrincipalId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

const CREDENTIALS_DIR: &str = ".credentials";
const COOKIE_FILE: &str = "cookies.txt";

/// What a purge removed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Regular files removed
    pub files: usize,
    /// Bytes freed by those files
    pub bytes: u64,
}

/// Hands out workspaces, one gate per principal
#[derive(Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
    /// One gate per principal ever seen. Entries are never pruned; the map is
    /// bounded by the allow-list, since strangers are refused before acquiring.
    gates: Mutex<HashMap<PrincipalId, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkspaceManager {
    /// Create a manager rooted at `root`. Nothing is created on disk yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory used for `principal`
    pub fn path_for(&self, principal: PrincipalId) -> PathBuf {
        self.root.join(format!("user_{}", principal))
    }

    /// Resolve a requester-supplied relative path inside the principal's
    /// directory, creating the directory if needed.
    ///
    /// Does not take the gate; a running request may change the contents.
    pub fn resolve(&self, principal: PrincipalId, relative: &str) -> Result<PathBuf, WorkspaceError> {
        let dir = self.path_for(principal);
        std::fs::create_dir_all(&dir).map_err(|source| WorkspaceError::Create {
            path: dir.clone(),
            source,
        })?;
        let base = std::fs::canonicalize(&dir).map_err(|source| WorkspaceError::Create {
            path: dir.clone(),
            source,
        })?;

        let candidate = base.join(relative);
        match std::fs::canonicalize(&candidate) {
            Ok(resolved) if resolved.starts_with(&base) => Ok(resolved),
            Ok(_) => Err(WorkspaceError::OutsideWorkspace { path: candidate }),
            Err(_) => Err(WorkspaceError::NotFound { path: candidate }),
        }
    }

    /// Wait for the principal's gate and make sure its directory exists
    pub async fn acquire(&self, principal: PrincipalId) -> Result<Workspace, WorkspaceError> {
        let gate = {
            let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
            gates
                .entry(principal)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = gate.lock_owned().await;

        let dir = self.path_for(principal);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: dir.clone(),
                source,
            })?;
        let dir = tokio::fs::canonicalize(&dir)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: dir.clone(),
                source,
            })?;

        debug!(principal = principal.get(), ?dir, "workspace acquired");

        Ok(Workspace {
            principal,
            dir,
            armed: true,
            _gate: guard,
        })
    }
}

/// Exclusive handle on one principal's directory
#[derive(Debug)]
pub struct Workspace {
    principal: PrincipalId,
    dir: PathBuf,
    armed: bool,
    _gate: OwnedMutexGuard<()>,
}

impl Workspace {
    /// Owning principal
    pub fn principal(&self) -> PrincipalId {
        self.principal
    }

    /// Absolute directory path
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Whether `path` resolves to a location inside this workspace
    pub fn contains(&self, path: &Path) -> bool {
        match std::fs::canonicalize(path) {
            Ok(resolved) => resolved.starts_with(&self.dir),
            Err(_) => false,
        }
    }

    /// Remove everything inside the workspace.
    ///
    /// Missing entries (or a missing directory) are not an error, so purging
    /// twice is a no-op.
    pub async fn purge(&mut self) -> Result<PurgeStats, WorkspaceError> {
        let dir = self.dir.clone();
        let stats = tokio::task::spawn_blocking(move || purge_dir(&dir))
            .await
            .map_err(|e| WorkspaceError::Purge {
                path: self.dir.clone(),
                source: std::io::Error::other(format!("purge task panicked: {e}")),
            })??;
        self.armed = false;
        debug!(
            principal = self.principal.get(),
            files = stats.files,
            bytes = stats.bytes,
            "workspace purged"
        );
        Ok(stats)
    }

    /// Release the workspace without purging (its files stay for a later request)
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(
            principal = self.principal.get(),
            dir = ?self.dir,
            "workspace released without explicit purge, purging now"
        );
        // keep the blocking walk off the async worker when the runtime allows it
        let on_worker = tokio::runtime::Handle::try_current()
            .is_ok_and(|h| h.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread);
        let result = if on_worker {
            tokio::task::block_in_place(|| purge_dir(&self.dir))
        } else {
            purge_dir(&self.dir)
        };
        if let Err(e) = result {
            warn!(principal = self.principal.get(), error = %e, "drop-time purge failed");
        }
    }
}

fn purge_dir(dir: &Path) -> Result<PurgeStats, WorkspaceError> {
    let mut stats = PurgeStats::default();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
        Err(source) => {
            return Err(WorkspaceError::Purge {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        let result = if file_type.is_dir() {
            tally_dir(&path, &mut stats);
            std::fs::remove_dir_all(&path)
        } else {
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            std::fs::remove_file(&path).map(|()| {
                stats.files += 1;
                stats.bytes += len;
            })
        };
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(WorkspaceError::Purge { path, source }),
        }
    }
    Ok(stats)
}

fn tally_dir(dir: &Path, stats: &mut PurgeStats) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => tally_dir(&entry.path(), stats),
            Ok(_) => {
                stats.files += 1;
                stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
            Err(_) => {}
        }
    }
}

/// Cookie files, kept outside the workspaces so purges leave them alone
#[derive(Clone, Debug)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Store credentials under `<workspace root>/.credentials`
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            dir: workspace_root.join(CREDENTIALS_DIR),
        }
    }

    /// Where the principal's cookie file lives (whether or not it exists)
    pub fn cookie_path(&self, principal: PrincipalId) -> PathBuf {
        self.dir
            .join(format!("user_{}", principal))
            .join(COOKIE_FILE)
    }

    /// The principal's cookie file, if one was stored
    pub async fn existing(&self, principal: PrincipalId) -> Option<PathBuf> {
        let path = self.cookie_path(principal);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Some(path),
            _ => None,
        }
    }

    /// Create the principal's credential directory and return the cookie path
    pub async fn prepare(&self, principal: PrincipalId) -> Result<PathBuf, WorkspaceError> {
        let path = self.cookie_path(principal);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| WorkspaceError::Create {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        Ok(path)
    }
}
