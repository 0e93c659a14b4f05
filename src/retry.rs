//! Retry with exponential backoff for transport calls
//!
//! Long-polling and downloads of user-sent files go through [`with_retry`] so
//! a flaky connection to the messaging API does not take the bot down. Reply
//! messages are sent once and a failure is only logged. Uploads are
//! NOT retried here: a failed unit ends the request and the requester is told
//! which part failed.
//!
//! # Example
//!
//! ```no_run
//! use relay_dl::config::RetryConfig;
//! use relay_dl::retry::{IsRetryable, with_retry};
//!
//! #[derive(Debug)]
//! enum PollError {
//!     Busy,
//!     Denied,
//! }
//!
//! impl std::fmt::Display for PollError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for PollError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, PollError::Busy)
//!     }
//! }
//!
//! # async fn example() -> Result<(), PollError> {
//! let updates = with_retry(&RetryConfig::default(), || async {
//!     Ok::<_, PollError>(Vec::<u8>::new())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, TransportError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies errors as transient (worth another attempt) or permanent
pub trait IsRetryable {
    /// Whether repeating the operation could succeed
    fn is_retryable(&self) -> bool;
}

fn io_is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::Interrupted
    )
}

impl IsRetryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            // 429 flood control and 5xx gateway hiccups clear on their own
            TransportError::Rejected { status, .. } => *status == 429 || *status >= 500,
            TransportError::Io(e) => io_is_transient(e),
            TransportError::Malformed(_) => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_retryable(),
            Error::Io(e) => io_is_transient(e),
            Error::ExternalTool(msg) => {
                msg.contains("timeout") || msg.contains("busy") || msg.contains("temporary")
            }
            Error::Config { .. }
            | Error::Fetch(_)
            | Error::Partition(_)
            | Error::Upload(_)
            | Error::Workspace(_)
            | Error::Extraction(_) => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or
/// `config.max_attempts` retries are used up.
///
/// Delays start at `initial_delay`, grow by `backoff_multiplier` and are capped
/// at `max_delay`. With `jitter` each sleep is stretched by a random 0-100%.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "transient failure, retrying"
                );

                let sleep_for = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(sleep_for).await;

                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(error = %e, attempts = attempt + 1, "retries exhausted");
                } else {
                    tracing::debug!(error = %e, "permanent failure, not retrying");
                }
                return Err(e);
            }
        }
    }
}

/// Stretch `delay` by a uniformly random factor in [1, 2]
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
