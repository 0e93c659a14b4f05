use super::{Command, HELP};
use crate::config::Config;
use crate::error::{Error, FetchError, Result, WorkspaceError};
use crate::extraction::{Extractor, classify};
use crate::partition::needs_split;
use crate::retry::with_retry;
use crate::scheduler::TransferScheduler;
use crate::transport::{Document, IncomingMessage, Transport};
use crate::types::{Artifact, ChatId, PrincipalId, Source, TransferRequest, UploadUnit};
use crate::utils::{self, format_mb, sanitize_file_name};
use crate::workspace::{CredentialStore, Workspace};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Most entries shown by `/list`
const LIST_LIMIT: usize = 20;

/// Subdirectory of the workspace that archives are unpacked into
const EXTRACT_DIR: &str = "extracted";

/// Authorizes incoming messages and runs the matching handler
///
/// Handlers reply through the transport themselves; an error escaping a
/// handler is reported to the chat as a single `❌` line.
pub struct CommandRouter {
    config: Arc<Config>,
    scheduler: TransferScheduler,
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    extractor: Extractor,
}

impl CommandRouter {
    /// Router over `scheduler`; credentials live under the scheduler's workspace root
    pub fn new(
        config: Arc<Config>,
        scheduler: TransferScheduler,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let credentials = CredentialStore::new(scheduler.workspaces().root());
        let extractor = Extractor::new(config.tools.sevenzip_path.clone());
        Self {
            config,
            scheduler,
            transport,
            credentials,
            extractor,
        }
    }

    /// Handle one incoming message
    pub async fn handle(&self, message: IncomingMessage) {
        let Some(principal) = message.principal() else {
            return;
        };
        let chat = message.chat_id();

        if !self.config.access.is_allowed(principal) {
            info!(principal = principal.get(), "rejected message from unauthorized user");
            self.reply(chat, "Not authorized.").await;
            return;
        }

        let result = match (&message.document, message.text.as_deref()) {
            (Some(document), _) => self.document(principal, chat, document).await,
            (None, Some(text)) => self.command(principal, chat, Command::parse(text)).await,
            (None, None) => Ok(()),
        };

        if let Err(e) = result {
            warn!(principal = principal.get(), error = %e, "command failed");
            self.reply(chat, &format!("❌ {e}")).await;
        }
    }

    async fn command(&self, principal: PrincipalId, chat: ChatId, command: Command) -> Result<()> {
        match command {
            Command::Start => {
                self.reply(chat, HELP).await;
                Ok(())
            }
            Command::Download(arg) => self.download(principal, chat, &arg).await,
            Command::Upload(arg) => self.upload(principal, chat, &arg).await,
            Command::Relay(arg) => self.relay(principal, chat, &arg).await,
            Command::List(arg) => self.list(principal, chat, arg.as_deref()).await,
            Command::Clean => self.clean(principal, chat).await,
            Command::Status => self.status(principal, chat).await,
            Command::Unknown(name) if name.is_empty() => Ok(()),
            Command::Unknown(_) => {
                self.reply(chat, "Unknown command. Send /start to see what I can do.")
                    .await;
                Ok(())
            }
        }
    }

    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.transport.send_message(chat, text).await {
            warn!(%chat, error = %e, "failed to send reply");
        }
    }

    /// Stored cookie file, warning the requester when there is none
    async fn credential_for(&self, principal: PrincipalId, chat: ChatId) -> Option<PathBuf> {
        let stored = self.credentials.existing(principal).await;
        if stored.is_none() {
            self.reply(
                chat,
                "⚠️ No cookies stored. Some sites refuse anonymous downloads; send a cookies.txt file to add yours.",
            )
            .await;
        }
        stored
    }

    async fn parse_locator(&self, chat: ChatId, arg: &str, usage: &str) -> Option<Url> {
        if arg.is_empty() {
            self.reply(chat, usage).await;
            return None;
        }
        match Url::parse(arg) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
            _ => {
                self.reply(chat, &format!("❌ Not a valid http(s) URL: {arg}"))
                    .await;
                None
            }
        }
    }

    async fn download(&self, principal: PrincipalId, chat: ChatId, arg: &str) -> Result<()> {
        let usage = "Please give a URL. Example: /download https://youtu.be/example";
        let Some(url) = self.parse_locator(chat, arg, usage).await else {
            return Ok(());
        };

        self.reply(chat, &format!("⏬ Downloading {url}...")).await;
        let credential = self.credential_for(principal, chat).await;
        let request =
            TransferRequest::new(principal, chat, Source::Remote(url)).with_credential(credential);

        match self.scheduler.fetch_only(request).await {
            Ok(artifact) => {
                let name = artifact.file_name();
                self.reply(
                    chat,
                    &format!(
                        "✅ Download complete: {name}\n📏 Size: {}\nUse /upload {name} to send it.",
                        format_mb(artifact.size)
                    ),
                )
                .await;
            }
            Err(Error::Fetch(e @ FetchError::AuthRequired { .. })) => {
                self.reply(
                    chat,
                    &format!(
                        "❌ Download failed: {e}\n🍪 The site wants a signed-in session. Send a fresh cookies.txt and try again."
                    ),
                )
                .await;
            }
            Err(e) => {
                self.reply(chat, &format!("❌ Download failed: {e}")).await;
            }
        }
        Ok(())
    }

    async fn upload(&self, principal: PrincipalId, chat: ChatId, arg: &str) -> Result<()> {
        if arg.is_empty() {
            self.reply(
                chat,
                "Please name a file. Example: /upload /path/to/file.mkv",
            )
            .await;
            return Ok(());
        }

        let path = self.local_path(principal, arg);
        let artifact = match Artifact::from_path(&path).await {
            Ok(artifact) => artifact,
            Err(_) => {
                self.reply(chat, &format!("❌ File {arg} does not exist."))
                    .await;
                return Ok(());
            }
        };

        let name = artifact.file_name();
        if needs_split(&artifact, self.config.transport.max_payload_bytes) {
            self.reply(
                chat,
                &format!(
                    "⚡ Preparing upload of large file {name} ({}), it will be sent in parts...",
                    format_mb(artifact.size)
                ),
            )
            .await;
        } else {
            self.reply(
                chat,
                &format!("⏫ Uploading {name} ({})...", format_mb(artifact.size)),
            )
            .await;
        }

        self.scheduler
            .run(TransferRequest::new(
                principal,
                chat,
                Source::Local(artifact.path),
            ))
            .await;
        Ok(())
    }

    async fn relay(&self, principal: PrincipalId, chat: ChatId, arg: &str) -> Result<()> {
        let usage = "Please give a URL. Example: /relay https://youtu.be/example";
        let Some(url) = self.parse_locator(chat, arg, usage).await else {
            return Ok(());
        };

        self.reply(chat, &format!("⏬ Downloading {url}, it will be uploaded when done..."))
            .await;
        let credential = self.credential_for(principal, chat).await;
        self.scheduler
            .run(TransferRequest::new(principal, chat, Source::Remote(url)).with_credential(credential))
            .await;
        Ok(())
    }

    /// Absolute paths are taken as-is; relative ones are inside the workspace
    fn local_path(&self, principal: PrincipalId, arg: &str) -> PathBuf {
        let path = Path::new(arg);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.scheduler.workspaces().path_for(principal).join(path)
        }
    }

    async fn list(&self, principal: PrincipalId, chat: ChatId, arg: Option<&str>) -> Result<()> {
        let workspaces = self.scheduler.workspaces();
        let root = workspaces.resolve(principal, "")?;
        let target = match workspaces.resolve(principal, arg.unwrap_or_default()) {
            Ok(target) => target,
            Err(WorkspaceError::OutsideWorkspace { .. }) => {
                self.reply(chat, "❌ That path is outside your workspace.")
                    .await;
                return Ok(());
            }
            Err(WorkspaceError::NotFound { .. }) => {
                self.reply(chat, "❌ The path does not exist.").await;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        let mut listing = tokio::fs::read_dir(&target).await?;
        while let Some(entry) = listing.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                files.push((entry.file_name().to_string_lossy().into_owned(), meta.len()));
            }
        }

        if files.is_empty() {
            self.reply(chat, "No files in this directory.").await;
            return Ok(());
        }
        files.sort();
        let shown = target.strip_prefix(&root).unwrap_or(&target);
        self.reply(chat, &render_listing(shown, &files)).await;
        Ok(())
    }

    async fn clean(&self, principal: PrincipalId, chat: ChatId) -> Result<()> {
        let mut workspace = self.scheduler.workspaces().acquire(principal).await?;
        let stats = workspace.purge().await?;
        info!(
            principal = principal.get(),
            files = stats.files,
            bytes = stats.bytes,
            "workspace cleaned on request"
        );
        self.reply(
            chat,
            &format!(
                "🧹 Deleted {} temporary files.\n💾 Space freed: {}",
                stats.files,
                format_mb(stats.bytes)
            ),
        )
        .await;
        Ok(())
    }

    async fn status(&self, principal: PrincipalId, chat: ChatId) -> Result<()> {
        let workspaces = self.scheduler.workspaces();
        tokio::fs::create_dir_all(workspaces.root()).await?;

        let mut lines = vec!["🖥️ Server status:\n".to_string()];

        match utils::disk_usage(workspaces.root()) {
            Ok(disk) => lines.push(format!(
                "💽 Disk: {}/{} ({:.1}% used)",
                utils::format_gb(disk.used()),
                utils::format_gb(disk.total),
                disk.percent_used()
            )),
            Err(e) => {
                warn!(error = %e, "disk usage unavailable");
                lines.push("💽 Disk: unavailable".to_string());
            }
        }

        match utils::memory_info().await {
            Some(mem) => {
                let used = mem.total.saturating_sub(mem.available);
                let percent = if mem.total == 0 {
                    0.0
                } else {
                    used as f64 * 100.0 / mem.total as f64
                };
                lines.push(format!(
                    "🧠 Memory: {}/{} ({percent:.1}% used)",
                    utils::format_gb(used),
                    utils::format_gb(mem.total)
                ));
            }
            None => lines.push("🧠 Memory: unavailable".to_string()),
        }

        match utils::load_average().await {
            Some([one, five, fifteen]) => lines.push(format!(
                "📊 System load: {one:.2}, {five:.2}, {fifteen:.2}"
            )),
            None => lines.push("📊 System load: unavailable".to_string()),
        }

        let files = count_files(&workspaces.path_for(principal)).await;
        lines.push(format!("📂 Workspace: {files} files"));

        self.reply(chat, &lines.join("\n")).await;
        Ok(())
    }

    async fn document(&self, principal: PrincipalId, chat: ChatId, document: &Document) -> Result<()> {
        let Some(name) = document.file_name.as_deref().and_then(sanitize_file_name) else {
            self.reply(chat, "❌ The file has no usable name.").await;
            return Ok(());
        };

        if name.to_ascii_lowercase().ends_with(".txt") {
            return self.store_cookies(principal, chat, document).await;
        }
        if classify(&name).is_some() {
            return self.unpack(principal, chat, document, &name).await;
        }

        self.reply(
            chat,
            "Send a cookies.txt file, or an archive (zip, 7z, rar, tar, gz, bz2) to get its contents back.",
        )
        .await;
        Ok(())
    }

    async fn store_cookies(&self, principal: PrincipalId, chat: ChatId, document: &Document) -> Result<()> {
        let path = self.credentials.prepare(principal).await?;
        let staging = path.with_extension("txt.part");

        let fetched = with_retry(&self.config.retry, || {
            self.transport.download_file(&document.file_id, &staging)
        })
        .await;
        if let Err(e) = fetched {
            tokio::fs::remove_file(&staging).await.ok();
            return Err(e.into());
        }
        tokio::fs::rename(&staging, &path).await?;

        info!(principal = principal.get(), "cookie file updated");
        self.reply(chat, "🍪 Cookie file updated.").await;
        Ok(())
    }

    async fn unpack(
        &self,
        principal: PrincipalId,
        chat: ChatId,
        document: &Document,
        name: &str,
    ) -> Result<()> {
        self.reply(chat, &format!("📦 Extracting {name}...")).await;

        let mut workspace = self.scheduler.workspaces().acquire(principal).await?;
        let result = self.unpack_in(&workspace, chat, document, name).await;
        if let Err(e) = workspace.purge().await {
            warn!(principal = principal.get(), error = %e, "workspace purge failed");
        }
        result
    }

    async fn unpack_in(
        &self,
        workspace: &Workspace,
        chat: ChatId,
        document: &Document,
        name: &str,
    ) -> Result<()> {
        let archive = workspace.path().join(name);
        with_retry(&self.config.retry, || {
            self.transport.download_file(&document.file_id, &archive)
        })
        .await?;

        let dest = workspace.path().join(EXTRACT_DIR);
        let files = self.extractor.extract_by_name(&archive, &dest).await?;
        if files.is_empty() {
            self.reply(chat, "The archive is empty.").await;
            return Ok(());
        }

        let ceiling = self.config.transport.max_payload_bytes;
        let deadline = self.config.upload.timeout;
        let total = files.len();
        let mut sent = 0;
        let mut failures = Vec::new();

        for path in files {
            let label = path
                .strip_prefix(&dest)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| path.display().to_string());
            let artifact = match Artifact::from_path(&path).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    failures.push(format!("{label}: {e}"));
                    continue;
                }
            };
            if needs_split(&artifact, ceiling) {
                failures.push(format!("{label}: too large to send ({})", format_mb(artifact.size)));
                continue;
            }

            let unit = UploadUnit::new(artifact, label.clone(), self.config.upload.direct_threshold_bytes);
            match tokio::time::timeout(deadline, self.transport.send_document(chat, &unit, deadline)).await {
                Ok(Ok(())) => sent += 1,
                Ok(Err(e)) => failures.push(format!("{label}: {e}")),
                Err(_) => failures.push(format!("{label}: timed out after {}s", deadline.as_secs())),
            }
        }

        let mut summary = format!("✅ Sent {sent}/{total} extracted files.");
        for failure in &failures {
            summary.push_str(&format!("\n❌ {failure}"));
        }
        self.reply(chat, &summary).await;
        Ok(())
    }
}

fn render_listing(shown: &Path, files: &[(String, u64)]) -> String {
    let total: u64 = files.iter().map(|(_, size)| size).sum();
    let location = if shown.as_os_str().is_empty() {
        "your workspace".to_string()
    } else {
        shown.display().to_string()
    };
    let mut message = format!(
        "📂 Contents of {location}:\n📊 Total files: {}\n📦 Total size: {}\n\nFiles:",
        files.len(),
        format_mb(total)
    );
    for (name, size) in files.iter().take(LIST_LIMIT) {
        message.push_str(&format!("\n{name} ({})", format_mb(*size)));
    }
    if files.len() > LIST_LIMIT {
        message.push_str(&format!("\n\n...and {} more files.", files.len() - LIST_LIMIT));
    }
    message
}

async fn count_files(dir: &Path) -> usize {
    let Ok(mut listing) = tokio::fs::read_dir(dir).await else {
        return 0;
    };
    let mut count = 0;
    while let Ok(Some(entry)) = listing.next_entry().await {
        if entry.file_type().await.is_ok_and(|t| t.is_file()) {
            count += 1;
        }
    }
    count
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RecordingTransport, ScriptedFetcher, ScriptedSplitter};
    use crate::transport::{Chat, User};
    use crate::workspace::WorkspaceManager;
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    const ALICE: i64 = 1001;
    const MALLORY: i64 = 666;

    struct Harness {
        router: CommandRouter,
        transport: Arc<RecordingTransport>,
        fetcher: Arc<ScriptedFetcher>,
        root: TempDir,
    }

    fn harness_with(fetcher: ScriptedFetcher, transport: RecordingTransport) -> Harness {
        let root = TempDir::new().unwrap();
        let mut config = Config::default();
        config.access.allowed_users = vec![ALICE];
        config.transport.max_payload_bytes = 2000;
        config.partition.part_size_bytes = 1900;
        config.retry.initial_delay = std::time::Duration::from_millis(10);
        config.retry.jitter = false;
        let config = Arc::new(config);

        let fetcher = Arc::new(fetcher);
        let transport = Arc::new(transport);
        let scheduler = TransferScheduler::new(
            config.clone(),
            fetcher.clone(),
            Arc::new(ScriptedSplitter::new()),
            transport.clone(),
            Arc::new(WorkspaceManager::new(root.path())),
        );
        let router = CommandRouter::new(config, scheduler, transport.clone());
        Harness {
            router,
            transport,
            fetcher,
            root,
        }
    }

    fn harness() -> Harness {
        harness_with(ScriptedFetcher::producing(500), RecordingTransport::default())
    }

    fn text(from: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            message_id: 1,
            from: Some(User {
                id: from,
                username: None,
            }),
            chat: Chat { id: from },
            text: Some(text.to_string()),
            caption: None,
            document: None,
        }
    }

    fn document(from: i64, name: &str) -> IncomingMessage {
        IncomingMessage {
            text: None,
            document: Some(Document {
                file_id: "FILE".to_string(),
                file_name: Some(name.to_string()),
                file_size: None,
            }),
            ..text(from, "")
        }
    }

    fn workspace(h: &Harness) -> PathBuf {
        h.root.path().join(format!("user_{ALICE}"))
    }

    #[tokio::test]
    async fn unauthorized_user_is_refused_before_any_work() {
        let h = harness();
        h.router.handle(text(MALLORY, "/relay https://example.com/v")).await;

        assert_eq!(h.transport.messages(), ["Not authorized."]);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_allow_list_denies_everyone() {
        let root = TempDir::new().unwrap();
        let config = Arc::new(Config::default());
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = TransferScheduler::new(
            config.clone(),
            Arc::new(ScriptedFetcher::producing(1)),
            Arc::new(ScriptedSplitter::new()),
            transport.clone(),
            Arc::new(WorkspaceManager::new(root.path())),
        );
        let router = CommandRouter::new(config, scheduler, transport.clone());

        router.handle(text(ALICE, "/start")).await;
        assert_eq!(transport.messages(), ["Not authorized."]);
    }

    #[tokio::test]
    async fn start_replies_with_help() {
        let h = harness();
        h.router.handle(text(ALICE, "/start")).await;
        assert_eq!(h.transport.messages(), [HELP]);
    }

    #[tokio::test]
    async fn plain_text_is_ignored_and_unknown_commands_hinted() {
        let h = harness();
        h.router.handle(text(ALICE, "hello")).await;
        assert!(h.transport.messages().is_empty());

        h.router.handle(text(ALICE, "/nope")).await;
        assert!(h.transport.messages()[0].starts_with("Unknown command"));
    }

    #[tokio::test]
    async fn download_keeps_file_and_warns_without_cookies() {
        let h = harness();
        h.router
            .handle(text(ALICE, "/download https://example.com/v/1"))
            .await;

        let messages = h.transport.messages();
        assert!(messages[0].starts_with("⏬ Downloading"));
        assert!(messages[1].starts_with("⚠️ No cookies stored"));
        assert!(messages[2].starts_with("✅ Download complete: clip.mkv"));
        assert!(messages[2].contains("/upload clip.mkv"));
        assert!(workspace(&h).join("clip.mkv").exists());
        assert!(h.transport.attempts().is_empty());
    }

    #[tokio::test]
    async fn download_rejects_non_http_locator() {
        let h = harness();
        h.router.handle(text(ALICE, "/download file:///etc/passwd")).await;
        assert!(h.transport.messages()[0].starts_with("❌ Not a valid http(s) URL"));
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auth_failure_suggests_fresh_cookies() {
        let h = harness_with(
            ScriptedFetcher::failing(FetchError::AuthRequired {
                diagnostic: "Sign in to confirm you're not a bot".to_string(),
            }),
            RecordingTransport::default(),
        );
        h.router
            .handle(text(ALICE, "/download https://example.com/v/1"))
            .await;
        let last = h.transport.messages().pop().unwrap();
        assert!(last.starts_with("❌ Download failed"));
        assert!(last.contains("cookies.txt"));
    }

    #[tokio::test]
    async fn upload_after_download_relays_relative_path() {
        let h = harness();
        h.router
            .handle(text(ALICE, "/download https://example.com/v/1"))
            .await;
        h.router.handle(text(ALICE, "/upload clip.mkv")).await;

        assert_eq!(h.transport.documents(), ["Full file: clip.mkv"]);
        assert_eq!(
            h.transport.messages().last().unwrap(),
            "✅ File uploaded successfully."
        );
        assert!(!workspace(&h).join("clip.mkv").exists());
    }

    #[tokio::test]
    async fn upload_of_missing_file_is_reported() {
        let h = harness();
        h.router.handle(text(ALICE, "/upload nothing.mkv")).await;
        assert_eq!(h.transport.messages(), ["❌ File nothing.mkv does not exist."]);
        assert!(h.transport.attempts().is_empty());
    }

    #[tokio::test]
    async fn large_upload_is_announced_and_split() {
        let h = harness();
        let big = h.root.path().join("big.mkv");
        std::fs::write(&big, vec![1u8; 5000]).unwrap();

        h.router
            .handle(text(ALICE, &format!("/upload {}", big.display())))
            .await;

        assert!(h.transport.messages()[0].starts_with("⚡ Preparing upload of large file big.mkv"));
        assert_eq!(h.transport.documents().len(), 3);
    }

    #[tokio::test]
    async fn relay_fetches_and_uploads() {
        let h = harness();
        h.router
            .handle(text(ALICE, "/relay https://example.com/v/1"))
            .await;
        assert_eq!(h.transport.documents(), ["Full file: clip.mkv"]);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn list_shows_files_and_refuses_escapes() {
        let h = harness();
        let ws = workspace(&h);
        std::fs::create_dir_all(&ws).unwrap();
        for i in 0..25 {
            std::fs::write(ws.join(format!("f{i:02}.bin")), vec![0u8; 1024]).unwrap();
        }

        h.router.handle(text(ALICE, "/list")).await;
        let listing = h.transport.messages().pop().unwrap();
        assert!(listing.contains("Total files: 25"));
        assert!(listing.contains("f00.bin (0.00 MB)"));
        assert!(!listing.contains("f20.bin"));
        assert!(listing.contains("...and 5 more files."));

        h.router.handle(text(ALICE, "/list ..")).await;
        assert_eq!(
            h.transport.messages().pop().unwrap(),
            "❌ That path is outside your workspace."
        );

        h.router.handle(text(ALICE, "/list missing")).await;
        assert_eq!(h.transport.messages().pop().unwrap(), "❌ The path does not exist.");
    }

    #[tokio::test]
    async fn list_of_empty_workspace() {
        let h = harness();
        h.router.handle(text(ALICE, "/list")).await;
        assert_eq!(h.transport.messages(), ["No files in this directory."]);
    }

    #[tokio::test]
    async fn clean_reports_deleted_files() {
        let h = harness();
        let ws = workspace(&h);
        std::fs::create_dir_all(&ws).unwrap();
        std::fs::write(ws.join("a.mkv"), vec![0u8; 1024 * 1024]).unwrap();
        std::fs::write(ws.join("b.mkv"), b"x").unwrap();

        h.router.handle(text(ALICE, "/clean")).await;

        let reply = h.transport.messages().pop().unwrap();
        assert!(reply.starts_with("🧹 Deleted 2 temporary files."), "{reply}");
        assert!(reply.contains("1.00 MB"));
        assert_eq!(std::fs::read_dir(&ws).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn status_reports_workspace_file_count() {
        let h = harness();
        let ws = workspace(&h);
        std::fs::create_dir_all(&ws).unwrap();
        std::fs::write(ws.join("a.mkv"), b"x").unwrap();

        h.router.handle(text(ALICE, "/status")).await;

        let reply = h.transport.messages().pop().unwrap();
        assert!(reply.starts_with("🖥️ Server status:"));
        assert!(reply.contains("💽 Disk:"));
        assert!(reply.contains("📂 Workspace: 1 files"));
    }

    #[tokio::test]
    async fn cookie_document_is_stored_outside_workspace() {
        let h = harness_with(
            ScriptedFetcher::producing(1),
            RecordingTransport {
                file_bytes: b"# Netscape HTTP Cookie File\n".to_vec(),
                ..RecordingTransport::default()
            },
        );

        h.router.handle(document(ALICE, "cookies.txt")).await;

        assert_eq!(h.transport.messages(), ["🍪 Cookie file updated."]);
        let stored = h
            .root
            .path()
            .join(".credentials")
            .join(format!("user_{ALICE}"))
            .join("cookies.txt");
        assert_eq!(
            std::fs::read_to_string(stored).unwrap(),
            "# Netscape HTTP Cookie File\n"
        );

        // a later download no longer warns about missing cookies
        h.router
            .handle(text(ALICE, "/download https://example.com/v/1"))
            .await;
        assert!(
            !h.transport
                .messages()
                .iter()
                .any(|m| m.starts_with("⚠️ No cookies stored"))
        );
    }

    #[tokio::test]
    async fn cookie_download_is_retried_after_gateway_error() {
        let h = harness_with(
            ScriptedFetcher::producing(1),
            RecordingTransport {
                file_bytes: b"# Netscape HTTP Cookie File\n".to_vec(),
                download_failures: std::sync::atomic::AtomicUsize::new(2),
                ..RecordingTransport::default()
            },
        );

        h.router.handle(document(ALICE, "cookies.txt")).await;

        assert_eq!(h.transport.messages(), ["🍪 Cookie file updated."]);
        assert_eq!(h.transport.download_failures.load(Ordering::SeqCst), 0);
        let stored = h
            .root
            .path()
            .join(".credentials")
            .join(format!("user_{ALICE}"))
            .join("cookies.txt");
        assert!(stored.exists());
    }

    #[tokio::test]
    async fn archive_document_is_extracted_and_sent_back() {
        let scratch = TempDir::new().unwrap();
        let zip_path = scratch.path().join("bundle.zip");
        {
            let mut writer = ::zip::ZipWriter::new(std::fs::File::create(&zip_path).unwrap());
            writer
                .start_file("a.txt", ::zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(b"alpha").unwrap();
            writer
                .start_file("docs/b.txt", ::zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(b"beta").unwrap();
            writer.finish().unwrap();
        }

        let h = harness_with(
            ScriptedFetcher::producing(1),
            RecordingTransport {
                file_bytes: std::fs::read(&zip_path).unwrap(),
                ..RecordingTransport::default()
            },
        );

        h.router.handle(document(ALICE, "bundle.zip")).await;

        assert_eq!(h.transport.documents(), ["a.txt", "docs/b.txt"]);
        let messages = h.transport.messages();
        assert_eq!(messages[0], "📦 Extracting bundle.zip...");
        assert_eq!(messages[1], "✅ Sent 2/2 extracted files.");
        assert_eq!(std::fs::read_dir(workspace(&h)).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn other_documents_get_an_explanation() {
        let h = harness();
        h.router.handle(document(ALICE, "movie.mkv")).await;
        assert!(h.transport.messages()[0].starts_with("Send a cookies.txt file"));
    }
}
