//! yt-dlp driven fetcher

use super::diagnostics::classify_failure;
use super::resolve::{DirSnapshot, resolve_artifact};
use super::traits::Fetcher;
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::types::Artifact;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

/// Fetcher backed by the external `yt-dlp` binary
///
/// The locator is passed after `--` in an argument vector, never through a
/// shell, so a hostile URL cannot inject options or commands.
///
/// # Examples
///
/// ```no_run
/// use relay_dl::config::FetchConfig;
/// use relay_dl::fetch::{CliFetcher, Fetcher};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = CliFetcher::from_path(FetchConfig::default())
///     .expect("yt-dlp not found in PATH");
/// let url = url::Url::parse("https://youtu.be/example")?;
/// let artifact = fetcher.fetch(&url, Path::new("/tmp/ws"), None).await?;
/// println!("{} ({} bytes)", artifact.path.display(), artifact.size);
/// # Ok(())
/// # }
/// ```
pub struct CliFetcher {
    binary_path: PathBuf,
    policy: FetchConfig,
}

impl CliFetcher {
    /// Create a fetcher with an explicit binary path
    pub fn new(binary_path: PathBuf, policy: FetchConfig) -> Self {
        Self {
            binary_path,
            policy,
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path(policy: FetchConfig) -> Option<Self> {
        which::which("yt-dlp").ok().map(|p| Self::new(p, policy))
    }

    /// Binary this fetcher runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Argument vector for one invocation
    pub fn build_args(
        &self,
        locator: &Url,
        workspace: &Path,
        credential: Option<&Path>,
    ) -> Vec<OsString> {
        let policy = &self.policy;
        let mut args: Vec<OsString> = vec![
            "-o".into(),
            workspace.join(&policy.output_template).into_os_string(),
            "--merge-output-format".into(),
            policy.merge_output_format.clone().into(),
        ];
        if policy.no_playlist {
            args.push("--no-playlist".into());
        }
        // file mtime = download time, so the post-run listing can spot it
        args.push("--no-mtime".into());
        args.extend([
            "--limit-rate".into(),
            policy.rate_limit.clone().into(),
            "--socket-timeout".into(),
            policy.socket_timeout_secs.to_string().into(),
            "--retries".into(),
            policy.retries.to_string().into(),
            "--fragment-retries".into(),
            policy.fragment_retries.to_string().into(),
            "--extractor-retries".into(),
            policy.extractor_retries.to_string().into(),
        ]);
        if let Some(cookies) = credential {
            args.push("--cookies".into());
            args.push(cookies.as_os_str().to_owned());
        }
        args.push("--".into());
        args.push(locator.as_str().into());
        args
    }
}

#[async_trait]
impl Fetcher for CliFetcher {
    async fn fetch(
        &self,
        locator: &Url,
        workspace: &Path,
        credential: Option<&Path>,
    ) -> Result<Artifact, FetchError> {
        if credential.is_none() {
            warn!(
                %locator,
                "no cookie file stored, fetching unauthenticated; some sources will refuse"
            );
        }

        let before = DirSnapshot::take(workspace).await;
        let args = self.build_args(locator, workspace, credential);
        debug!(binary = ?self.binary_path, ?args, "running downloader");

        let output = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::Spawn {
                tool: self.binary_path.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let err = classify_failure(&output.status.to_string(), &output.stdout, &output.stderr);
            warn!(%locator, error = %err, "downloader failed");
            return Err(err);
        }

        let already_present =
            String::from_utf8_lossy(&output.stdout).contains("has already been downloaded");
        let artifact = resolve_artifact(
            workspace,
            &before,
            &self.policy.media_extensions,
            already_present,
        )
        .await?;

        info!(
            %locator,
            path = ?artifact.path,
            size = artifact.size,
            "download complete"
        );
        Ok(artifact)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
