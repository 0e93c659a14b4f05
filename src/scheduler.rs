//! Transfer scheduler: drives one request from fetch to upload
//!
//! ```text
//! FETCHING -> SIZE_CHECK -> DIRECT_UPLOAD ---------------------> DONE | FAILED
//!                        \-> SPLITTING -> PART_UPLOAD(1..N) ---> DONE | PARTIAL_FAILED | FAILED
//! ```
//!
//! Every terminal state purges the principal's workspace and sends exactly
//! one summary message to the requesting chat. Parts go out strictly in
//! order; the first failing part stops the run.

use crate::config::Config;
use crate::error::{Error, FetchError, Result, UploadError};
use crate::fetch::Fetcher;
use crate::partition::{Splitter, needs_split};
use crate::transport::Transport;
use crate::types::{
    Artifact, ChatId, Event, PrincipalId, Source, Stage, TransferOutcome, TransferRequest,
    TransferSummary, UnitOutcome, UploadUnit,
};
use crate::workspace::{Workspace, WorkspaceManager};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Runs transfer requests against the injected fetcher, splitter and transport
///
/// Cheap to clone; clones share the event channel and the workspace gates.
#[derive(Clone)]
pub struct TransferScheduler {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    splitter: Arc<dyn Splitter>,
    transport: Arc<dyn Transport>,
    workspaces: Arc<WorkspaceManager>,
    event_tx: broadcast::Sender<Event>,
}

impl TransferScheduler {
    /// Assemble a scheduler from its collaborators
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn Fetcher>,
        splitter: Arc<dyn Splitter>,
        transport: Arc<dyn Transport>,
        workspaces: Arc<WorkspaceManager>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            config,
            fetcher,
            splitter,
            transport,
            workspaces,
            event_tx,
        }
    }

    /// Subscribe to lifecycle events of every request
    ///
    /// Events are dropped when nobody is subscribed; slow subscribers see
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Workspace manager shared with the command router
    pub fn workspaces(&self) -> &Arc<WorkspaceManager> {
        &self.workspaces
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Run the whole pipeline for `request` and report the outcome to its chat.
    ///
    /// Never fails: every problem ends in a terminal state carried by the
    /// returned summary.
    pub async fn run(&self, request: TransferRequest) -> TransferSummary {
        let principal = request.principal;

        let summary = match self.workspaces.acquire(principal).await {
            Ok(mut workspace) => {
                let summary = self.pipeline(&request, &workspace).await;
                if let Err(e) = workspace.purge().await {
                    warn!(principal = principal.get(), error = %e, "workspace purge failed");
                }
                summary
            }
            Err(e) => {
                error!(principal = principal.get(), error = %e, "workspace unavailable");
                TransferSummary {
                    outcome: TransferOutcome::Failed {
                        stage: Stage::Fetching,
                        reason: e.to_string(),
                    },
                    units: Vec::new(),
                }
            }
        };

        info!(
            principal = principal.get(),
            state = ?summary.state(),
            completed = summary.completed(),
            "transfer finished"
        );
        self.emit(Event::Finished {
            principal,
            state: summary.state(),
        });
        self.notify(request.chat, &summary.message()).await;
        summary
    }

    /// Fetch only, leaving the artifact in the workspace for a later upload.
    ///
    /// On failure the workspace is purged and the error returned; no summary
    /// message is sent (the caller replies).
    pub async fn fetch_only(&self, request: TransferRequest) -> Result<Artifact> {
        let principal = request.principal;
        let mut workspace = self.workspaces.acquire(principal).await?;

        match self.obtain(&request, &workspace).await {
            Ok(artifact) => {
                workspace.keep();
                Ok(artifact)
            }
            Err(e) => {
                if let Err(purge_err) = workspace.purge().await {
                    warn!(principal = principal.get(), error = %purge_err, "workspace purge failed");
                }
                Err(Error::Fetch(e))
            }
        }
    }

    async fn pipeline(&self, request: &TransferRequest, workspace: &Workspace) -> TransferSummary {
        let principal = request.principal;

        let artifact = match self.obtain(request, workspace).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(principal = principal.get(), stage = %Stage::Fetching, error = %e, "fetch failed");
                return failed(Stage::Fetching, e.to_string());
            }
        };

        let ceiling = self.config.transport.max_payload_bytes;
        debug!(
            principal = principal.get(),
            size = artifact.size,
            ceiling,
            "size check"
        );

        if !needs_split(&artifact, ceiling) {
            return self.direct_upload(request, artifact).await;
        }

        let parts = match self.split(request.principal, &artifact, workspace).await {
            Ok(units) => units,
            Err(summary) => return summary,
        };
        self.part_upload(request.chat, principal, parts).await
    }

    /// FETCHING: remote locators go through the fetcher, local paths are stat'ed
    async fn obtain(
        &self,
        request: &TransferRequest,
        workspace: &Workspace,
    ) -> std::result::Result<Artifact, FetchError> {
        let principal = request.principal;
        self.emit(Event::Fetching { principal });
        info!(principal = principal.get(), stage = %Stage::Fetching, "stage started");

        let artifact = match &request.source {
            Source::Remote(locator) => {
                self.fetcher
                    .fetch(locator, workspace.path(), request.credential.as_deref())
                    .await?
            }
            Source::Local(path) => Artifact::from_path(path).await.map_err(|e| {
                debug!(?path, error = %e, "local source unusable");
                FetchError::SourceMissing { path: path.clone() }
            })?,
        };

        self.emit(Event::Fetched {
            principal,
            path: artifact.path.clone(),
            size: artifact.size,
        });
        Ok(artifact)
    }

    async fn direct_upload(&self, request: &TransferRequest, artifact: Artifact) -> TransferSummary {
        let principal = request.principal;
        info!(principal = principal.get(), stage = %Stage::DirectUpload, "stage started");

        let unit = UploadUnit::whole(artifact, self.config.upload.direct_threshold_bytes);
        self.emit(Event::Uploading {
            principal,
            index: 1,
            total: 1,
        });
        match self.upload_unit(request.chat, &unit).await {
            Ok(()) => {
                self.emit(Event::Uploaded {
                    principal,
                    index: 1,
                    total: 1,
                });
                TransferSummary {
                    outcome: TransferOutcome::Done { units: 1 },
                    units: vec![UnitOutcome::Success],
                }
            }
            Err(e) => {
                error!(principal = principal.get(), stage = %Stage::DirectUpload, error = %e, "upload failed");
                TransferSummary {
                    outcome: TransferOutcome::Failed {
                        stage: Stage::DirectUpload,
                        reason: e.to_string(),
                    },
                    units: vec![UnitOutcome::Failed(e.to_string())],
                }
            }
        }
    }

    /// SPLITTING: returns the ordered upload units, or the terminal summary
    async fn split(
        &self,
        principal: PrincipalId,
        artifact: &Artifact,
        workspace: &Workspace,
    ) -> std::result::Result<Vec<UploadUnit>, TransferSummary> {
        info!(
            principal = principal.get(),
            stage = %Stage::Splitting,
            splitter = self.splitter.name(),
            size = artifact.size,
            "stage started"
        );
        self.emit(Event::Splitting { principal });

        let part_set = self
            .splitter
            .split(
                artifact,
                self.config.partition.part_size_bytes,
                workspace.path(),
            )
            .await
            .map_err(|e| {
                error!(principal = principal.get(), stage = %Stage::Splitting, error = %e, "split failed");
                failed(Stage::Splitting, e.to_string())
            })?;

        if part_set.is_empty() {
            return Err(failed(Stage::Splitting, "no parts produced".to_string()));
        }
        self.emit(Event::Split {
            principal,
            parts: part_set.len(),
        });

        if self.config.partition.delete_source_after_split && workspace.contains(&artifact.path) {
            match tokio::fs::remove_file(&artifact.path).await {
                Ok(()) => debug!(path = ?artifact.path, "source removed after split"),
                Err(e) => warn!(path = ?artifact.path, error = %e, "could not remove source"),
            }
        }

        Ok(part_set.units(self.config.upload.direct_threshold_bytes))
    }

    /// PART_UPLOAD: strictly sequential, acknowledged one by one
    async fn part_upload(
        &self,
        chat: ChatId,
        principal: PrincipalId,
        units: Vec<UploadUnit>,
    ) -> TransferSummary {
        let total = units.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, unit) in units.iter().enumerate() {
            let index = i + 1;
            info!(principal = principal.get(), stage = %Stage::PartUpload, part = index, total, "uploading part");
            self.emit(Event::Uploading {
                principal,
                index,
                total,
            });

            if let Err(e) = self.upload_unit(chat, unit).await {
                error!(
                    principal = principal.get(),
                    stage = %Stage::PartUpload,
                    part = index,
                    total,
                    error = %e,
                    "part upload failed, aborting remaining parts"
                );
                outcomes.push(UnitOutcome::Failed(e.to_string()));
                return TransferSummary {
                    outcome: TransferOutcome::PartialFailed {
                        failed_unit: index,
                        completed: index - 1,
                        total,
                        reason: e.to_string(),
                    },
                    units: outcomes,
                };
            }

            outcomes.push(UnitOutcome::Success);
            self.emit(Event::Uploaded {
                principal,
                index,
                total,
            });
            self.notify(chat, &format!("✅ Part {index}/{total} uploaded"))
                .await;
        }

        TransferSummary {
            outcome: TransferOutcome::Done { units: total },
            units: outcomes,
        }
    }

    /// One upload unit under the per-unit deadline
    async fn upload_unit(&self, chat: ChatId, unit: &UploadUnit) -> std::result::Result<(), UploadError> {
        let deadline = self.config.upload.timeout;
        let name = unit.artifact.file_name();
        match tokio::time::timeout(deadline, self.transport.send_document(chat, unit, deadline)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(UploadError::Transport { name, source }),
            Err(_) => Err(UploadError::Timeout {
                name,
                secs: deadline.as_secs(),
            }),
        }
    }

    /// Send a message, logging instead of failing
    async fn notify(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.transport.send_message(chat, text).await {
            warn!(%chat, error = %e, "failed to send message");
        }
    }
}

fn failed(stage: Stage, reason: String) -> TransferSummary {
    TransferSummary {
        outcome: TransferOutcome::Failed { stage, reason },
        units: Vec::new(),
    }
}
