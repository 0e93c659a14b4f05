//! Shared test doubles: fake tool scripts, scripted fetcher/splitter/transport.

use crate::error::{FetchError, PartitionError, TransportError};
use crate::fetch::Fetcher;
use crate::partition::Splitter;
use crate::transport::{Transport, Update};
use crate::types::{Artifact, ChatId, PartSet, UploadUnit};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// Write an executable shell script named `name` into `dir`
#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Artifact with a claimed size that need not match the file on disk
pub(crate) fn fake_artifact(path: PathBuf, size: u64) -> Artifact {
    Artifact {
        path,
        size,
        created: Utc::now(),
    }
}

/// Fetcher that writes a small file into the workspace and claims `size` bytes,
/// or fails with the configured error. With `full` set, the file really is `size` bytes.
pub(crate) struct ScriptedFetcher {
    pub(crate) size: u64,
    pub(crate) full: bool,
    pub(crate) fail_with: Mutex<Option<FetchError>>,
    pub(crate) calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn producing(size: u64) -> Self {
        Self {
            size,
            full: false,
            fail_with: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn writing(size: u64) -> Self {
        Self {
            full: true,
            ..Self::producing(size)
        }
    }

    pub(crate) fn failing(err: FetchError) -> Self {
        Self {
            size: 0,
            full: false,
            fail_with: Mutex::new(Some(err)),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _locator: &Url,
        workspace: &Path,
        _credential: Option<&Path>,
    ) -> Result<Artifact, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_with.lock().unwrap().take() {
            return Err(err);
        }
        let path = workspace.join("clip.mkv");
        if self.full {
            tokio::fs::write(&path, vec![7u8; self.size as usize])
                .await
                .unwrap();
            return Ok(Artifact::from_path(&path).await.unwrap());
        }
        tokio::fs::write(&path, b"video").await.unwrap();
        Ok(fake_artifact(path, self.size))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Splitter that writes tiny placeholder parts carrying the requested sizes
pub(crate) struct ScriptedSplitter {
    pub(crate) calls: AtomicUsize,
    pub(crate) fail: bool,
}

impl ScriptedSplitter {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl Splitter for ScriptedSplitter {
    async fn split(
        &self,
        artifact: &Artifact,
        part_size: u64,
        output_dir: &Path,
    ) -> Result<PartSet, PartitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PartitionError::ToolFailed {
                status: "exit status: 2".to_string(),
                diagnostic: "Not enough space".to_string(),
            });
        }
        let stem = artifact
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut parts = Vec::new();
        let mut remaining = artifact.size;
        let mut index = 1;
        while remaining > 0 {
            let size = remaining.min(part_size);
            let path = output_dir.join(format!("{stem}.7z.{index:03}"));
            tokio::fs::write(&path, b"part").await.unwrap();
            parts.push(fake_artifact(path, size));
            remaining -= size;
            index += 1;
        }
        Ok(PartSet {
            source_name: artifact.file_name(),
            parts,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Transport that records everything and fails or stalls chosen uploads
#[derive(Default)]
pub(crate) struct RecordingTransport {
    /// Captions of accepted documents, in order
    pub(crate) documents: Mutex<Vec<String>>,
    /// Captions of every attempted document, in order
    pub(crate) attempts: Mutex<Vec<String>>,
    /// On-disk sizes of accepted documents, read at send time
    pub(crate) sizes: Mutex<Vec<u64>>,
    /// Messages sent, in order
    pub(crate) messages: Mutex<Vec<String>>,
    /// 1-based upload attempts that fail with a rejection
    pub(crate) reject: HashSet<usize>,
    /// 1-based upload attempts that hang past any deadline
    pub(crate) stall: HashSet<usize>,
    /// Bytes written by download_file
    pub(crate) file_bytes: Vec<u8>,
    /// Leading download_file calls that fail with a gateway error
    pub(crate) download_failures: AtomicUsize,
    /// Batches handed out by get_updates, front first
    pub(crate) updates: Mutex<VecDeque<Vec<Update>>>,
    /// Offsets get_updates was polled with
    pub(crate) offsets: Mutex<Vec<i64>>,
}

impl RecordingTransport {
    pub(crate) fn documents(&self) -> Vec<String> {
        self.documents.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn sizes(&self) -> Vec<u64> {
        self.sizes.lock().unwrap().clone()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub(crate) fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_document(
        &self,
        _chat: ChatId,
        unit: &UploadUnit,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(unit.caption.clone());
            attempts.len()
        };
        if self.stall.contains(&attempt) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.reject.contains(&attempt) {
            return Err(TransportError::Rejected {
                status: 413,
                description: "Request Entity Too Large".to_string(),
            });
        }
        let on_disk = tokio::fs::metadata(&unit.artifact.path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        self.sizes.lock().unwrap().push(on_disk);
        self.documents.lock().unwrap().push(unit.caption.clone());
        Ok(())
    }

    async fn send_message(&self, _chat: ChatId, text: &str) -> Result<(), TransportError> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn download_file(&self, _file_id: &str, dest: &Path) -> Result<u64, TransportError> {
        let failing = self
            .download_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Rejected {
                status: 502,
                description: "Bad Gateway".to_string(),
            });
        }
        tokio::fs::write(dest, &self.file_bytes).await?;
        Ok(self.file_bytes.len() as u64)
    }

    async fn get_updates(
        &self,
        offset: i64,
        _timeout: Duration,
    ) -> Result<Vec<Update>, TransportError> {
        self.offsets.lock().unwrap().push(offset);
        let batch = self.updates.lock().unwrap().pop_front();
        match batch {
            Some(batch) => Ok(batch),
            None => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Vec::new())
            }
        }
    }
}
