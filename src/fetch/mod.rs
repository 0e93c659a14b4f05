//! Acquiring media with an external downloader
//!
//! The [`Fetcher`] trait is the seam the transfer scheduler depends on.
//! [`CliFetcher`] drives `yt-dlp` as a subprocess: it builds the argument
//! vector from [`FetchConfig`](crate::config::FetchConfig), injects the
//! principal's cookie file when one is stored, and afterwards resolves the
//! produced file by comparing the workspace listing before and after the run.
//!
//! Retries for flaky networks are configured on the tool itself
//! (`--retries`, `--fragment-retries`, `--extractor-retries`); nothing here
//! re-runs a failed fetch.

mod cli;
mod diagnostics;
mod resolve;
mod traits;

pub use cli::CliFetcher;
pub use diagnostics::{classify_failure, is_auth_failure};
pub use resolve::{DirSnapshot, resolve_artifact};
pub use traits::Fetcher;
