//! Fetcher trait

use crate::error::FetchError;
use crate::types::Artifact;
use async_trait::async_trait;
use std::path::Path;
use url::Url;

/// Something that turns a locator into a file in the workspace
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `locator` into `workspace` and return the produced file
    ///
    /// `credential` is a cookie file passed through to the tool when present.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Spawn`] if the tool cannot be started
    /// - [`FetchError::AuthRequired`] if the source wants a login
    /// - [`FetchError::ToolFailed`] for any other non-zero exit
    /// - [`FetchError::NoArtifact`] if the tool succeeded but left no media file
    async fn fetch(
        &self,
        locator: &Url,
        workspace: &Path,
        credential: Option<&Path>,
    ) -> Result<Artifact, FetchError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
