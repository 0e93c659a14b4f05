//! Long-polling bot loop
//!
//! [`Bot`] owns the wired-up components and feeds every incoming message to
//! the [`CommandRouter`] on its own task.

use crate::commands::CommandRouter;
use crate::config::{Config, SplitStrategy};
use crate::error::{Error, Result};
use crate::fetch::{CliFetcher, Fetcher};
use crate::partition::{RawSplitter, SevenZipSplitter, Splitter};
use crate::retry::{IsRetryable, with_retry};
use crate::scheduler::TransferScheduler;
use crate::transport::{TelegramTransport, Transport};
use crate::workspace::WorkspaceManager;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The assembled bot: transport, scheduler and router
pub struct Bot {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    scheduler: TransferScheduler,
    router: Arc<CommandRouter>,
}

impl Bot {
    /// Wire production components from `config` and check the token with `getMe`.
    ///
    /// Fails when the downloader (or, with the archiver strategy, 7z) cannot be
    /// found, or when the Bot API refuses the token.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let fetcher = resolve_fetcher(&config)?;
        let splitter = resolve_splitter(&config)?;
        let telegram = TelegramTransport::new(&config.transport)?;

        let username = telegram.get_me().await?;
        info!(
            username = username.as_deref().unwrap_or("<unknown>"),
            allowed_users = config.access.allowed_users.len(),
            splitter = splitter.name(),
            "connected to Bot API"
        );
        if config.access.allowed_users.is_empty() {
            warn!("allow-list is empty, every message will be refused");
        }

        Ok(Self::new(config, fetcher, splitter, Arc::new(telegram)))
    }

    /// Assemble a bot from already constructed collaborators
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn Fetcher>,
        splitter: Arc<dyn Splitter>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let workspaces = Arc::new(WorkspaceManager::new(config.workspace.root.clone()));
        let scheduler = TransferScheduler::new(
            config.clone(),
            fetcher,
            splitter,
            transport.clone(),
            workspaces,
        );
        let router = Arc::new(CommandRouter::new(
            config.clone(),
            scheduler.clone(),
            transport.clone(),
        ));
        Self {
            config,
            transport,
            scheduler,
            router,
        }
    }

    /// Scheduler behind the router, for event subscriptions
    pub fn scheduler(&self) -> &TransferScheduler {
        &self.scheduler
    }

    /// Poll for updates until `shutdown` is cancelled.
    ///
    /// Each message is handled on its own task. On shutdown the loop stops
    /// polling and waits for handlers still in flight. Returns an error only
    /// when polling fails permanently (for example a revoked token).
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let poll_timeout = self.config.transport.poll_timeout;
        let mut offset = 0_i64;
        let mut handlers = JoinSet::new();

        info!("polling for updates");
        let result = loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                polled = with_retry(&self.config.retry, || {
                    self.transport.get_updates(offset, poll_timeout)
                }) => polled,
            };

            let updates = match polled {
                Ok(updates) => updates,
                Err(e) if e.is_retryable() => {
                    error!(error = %e, "polling keeps failing, starting over");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "polling failed permanently");
                    break Err(Error::from(e));
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    debug!(update_id = update.update_id, "skipping update without message");
                    continue;
                };
                let router = self.router.clone();
                handlers.spawn(async move { router.handle(message).await });
            }

            while let Some(finished) = handlers.try_join_next() {
                if let Err(e) = finished {
                    error!(error = %e, "message handler panicked");
                }
            }
        };

        if !handlers.is_empty() {
            info!(in_flight = handlers.len(), "waiting for running requests");
        }
        while let Some(finished) = handlers.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "message handler panicked");
            }
        }
        info!("update loop stopped");
        result
    }
}

fn resolve_fetcher(config: &Config) -> Result<Arc<dyn Fetcher>> {
    let policy = config.fetch.clone();
    let fetcher = match &config.tools.yt_dlp_path {
        Some(path) => CliFetcher::new(path.clone(), policy),
        None if config.tools.search_path => CliFetcher::from_path(policy).ok_or_else(|| {
            Error::ExternalTool("yt-dlp not found in PATH; set RELAY_YT_DLP".to_string())
        })?,
        None => {
            return Err(Error::Config {
                message: "no yt-dlp path configured and PATH search is disabled".to_string(),
                key: Some("tools.yt_dlp_path".to_string()),
            });
        }
    };
    info!(binary = ?fetcher.binary_path(), "using yt-dlp");
    Ok(Arc::new(fetcher))
}

fn resolve_splitter(config: &Config) -> Result<Arc<dyn Splitter>> {
    if config.partition.strategy == SplitStrategy::Raw {
        return Ok(Arc::new(RawSplitter));
    }
    let splitter = match &config.tools.sevenzip_path {
        Some(path) => SevenZipSplitter::new(path.clone()),
        None if config.tools.search_path => SevenZipSplitter::from_path().ok_or_else(|| {
            Error::ExternalTool("7z not found in PATH; set RELAY_7Z".to_string())
        })?,
        None => {
            return Err(Error::Config {
                message: "no 7z path configured and PATH search is disabled".to_string(),
                key: Some("tools.sevenzip_path".to_string()),
            });
        }
    };
    info!(binary = ?splitter.binary_path(), "using 7z");
    Ok(Arc::new(splitter))
}
