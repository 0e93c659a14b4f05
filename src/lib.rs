//! # relay-dl
//!
//! Fetch media with yt-dlp and relay it to a Telegram chat, splitting files
//! that exceed the Bot API upload ceiling into ordered parts.
//!
//! ## Pipeline
//!
//! Each request runs in the requesting user's private workspace:
//!
//! 1. **Fetch** - run the downloader (or take a file already on disk)
//! 2. **Size check** - compare against the transport's payload ceiling
//! 3. **Upload** - send the file whole, or split it and send the parts in order
//! 4. **Purge** - empty the workspace and post one summary message
//!
//! ## Quick Start
//!
//! ```no_run
//! use relay_dl::{Bot, Config, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let bot = Bot::connect(config).await?;
//!
//!     // Subscribe to transfer events
//!     let mut events = bot.scheduler().subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     run_with_shutdown(bot).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Long-polling bot loop
pub mod bot;
/// Chat command parsing and handling
pub mod commands;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Downloader adapter
pub mod fetch;
/// Splitting oversized files into parts
pub mod partition;
/// Retry logic with exponential backoff
pub mod retry;
/// Fetch-to-upload orchestration
pub mod scheduler;
/// Messaging transport
pub mod transport;
/// Core types and events
pub mod types;
/// Host statistics and formatting helpers
pub mod utils;
/// Per-user workspaces and stored credentials
pub mod workspace;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use bot::Bot;
pub use commands::{Command, CommandRouter};
pub use config::{Config, SplitStrategy};
pub use error::{
    Error, ExtractionError, FetchError, PartitionError, Result, TransportError, UploadError,
    WorkspaceError,
};
pub use extraction::{ArchiveKind, Extractor};
pub use fetch::{CliFetcher, Fetcher};
pub use partition::{RawSplitter, SevenZipSplitter, Splitter};
pub use scheduler::TransferScheduler;
pub use transport::{TelegramTransport, Transport};
pub use types::{
    Artifact, ChatId, Event, PartSet, PrincipalId, Source, Stage, TerminalState,
    TransferOutcome, TransferRequest, TransferSummary, UploadStrategy, UploadUnit,
};
pub use workspace::{CredentialStore, Workspace, WorkspaceManager};

/// Run the bot until a termination signal arrives.
///
/// On the signal the update loop stops polling and waits for requests that
/// are already running.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(bot: Bot) -> Result<()> {
    let shutdown = tokio_util::sync::CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });
    bot.run(shutdown).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "could not register both signal handlers");
            only.recv().await;
            tracing::info!("received termination signal, shutting down");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
