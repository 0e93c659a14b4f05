//! Configuration types for relay-dl
//!
//! [`Config`] is constructed once at startup (usually through
//! [`Config::from_env`]) and handed to the components that need it. Nothing
//! in the crate reads configuration from globals.

use crate::error::{Error, Result};
use crate::types::PrincipalId;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Transport (Telegram Bot API) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Base URL of the Bot API (default: "https://api.telegram.org")
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bot token
    #[serde(default)]
    pub token: String,

    /// Largest payload the transport accepts in one message (default: 2 GiB)
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: u64,

    /// Long-poll timeout for getUpdates (default: 30 seconds)
    #[serde(default = "default_poll_timeout", with = "duration_serde")]
    pub poll_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: String::new(),
            max_payload_bytes: default_max_payload(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

/// Upload behaviour
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Deadline for one upload unit, independent of its size (default: 300 seconds)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Units up to this size are buffered and sent directly; larger ones are
    /// streamed (default: 50 MiB)
    #[serde(default = "default_direct_threshold")]
    pub direct_threshold_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            timeout: default_upload_timeout(),
            direct_threshold_bytes: default_direct_threshold(),
        }
    }
}

/// Argument policy for the external downloader (yt-dlp)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Output file name template, relative to the workspace
    #[serde(default = "default_output_template")]
    pub output_template: String,

    /// Container format for merged streams (default: "mkv")
    #[serde(default = "default_merge_format")]
    pub merge_output_format: String,

    /// Pass `--no-playlist` (default: true)
    #[serde(default = "default_true")]
    pub no_playlist: bool,

    /// Download rate cap, in yt-dlp notation (default: "50M")
    #[serde(default = "default_rate_limit")]
    pub rate_limit: String,

    /// Socket timeout in seconds (default: 30)
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_secs: u32,

    /// Retries for transient network failures (default: 10)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Retries per fragment (default: 10)
    #[serde(default = "default_retries")]
    pub fragment_retries: u32,

    /// Retries for extractor errors (default: 5)
    #[serde(default = "default_extractor_retries")]
    pub extractor_retries: u32,

    /// Extensions treated as downloaded media when resolving the artifact
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            output_template: default_output_template(),
            merge_output_format: default_merge_format(),
            no_playlist: true,
            rate_limit: default_rate_limit(),
            socket_timeout_secs: default_socket_timeout(),
            retries: default_retries(),
            fragment_retries: default_retries(),
            extractor_retries: default_extractor_retries(),
            media_extensions: default_media_extensions(),
        }
    }
}

/// How oversized files are segmented
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Store-only multi-volume 7z archive (default)
    #[default]
    Archiver,
    /// Native byte-exact segmentation, no external tool
    Raw,
}

/// Partitioning settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Maximum size of one part, strictly below the transport ceiling
    /// (default: 1.9 GiB)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: u64,

    /// Segmentation strategy
    #[serde(default)]
    pub strategy: SplitStrategy,

    /// Delete the source file once its parts exist, if it lives in the workspace
    /// (default: true)
    #[serde(default = "default_true")]
    pub delete_source_after_split: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            part_size_bytes: default_part_size(),
            strategy: SplitStrategy::default(),
            delete_source_after_split: true,
        }
    }
}

/// Workspace location
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root under which per-principal directories are created
    /// (default: "./temp_downloads")
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
        }
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to yt-dlp (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,

    /// Path to 7z (auto-detected if None)
    #[serde(default)]
    pub sevenzip_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: None,
            sevenzip_path: None,
            search_path: true,
        }
    }
}

/// Who may use the bot
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Authorized principal ids. An empty list authorizes nobody.
    #[serde(default)]
    pub allowed_users: Vec<i64>,
}

impl AccessConfig {
    /// Whether `principal` is on the allow-list
    pub fn is_allowed(&self, principal: PrincipalId) -> bool {
        self.allowed_users.contains(&principal.get())
    }
}

/// Retry configuration for transient transport failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Main configuration
///
/// Fields are grouped into sub-configs:
/// - [`transport`](TransportConfig): Bot API endpoint, token, payload ceiling
/// - [`upload`](UploadConfig): per-unit deadline and direct/streamed threshold
/// - [`fetch`](FetchConfig): yt-dlp argument policy
/// - [`partition`](PartitionConfig): part size and split strategy
/// - [`workspace`](WorkspaceConfig): scratch directory root
/// - [`tools`](ToolsConfig): external binary locations
/// - [`access`](AccessConfig): allow-list
/// - [`retry`](RetryConfig): backoff for transport control calls
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Upload settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Downloader policy
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Partitioning settings
    #[serde(default)]
    pub partition: PartitionConfig,

    /// Workspace location
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Allow-list
    #[serde(default)]
    pub access: AccessConfig,

    /// Retry policy for transport polling and file downloads
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Build a configuration from process environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// | Variable               | Field                          |
    /// |------------------------|--------------------------------|
    /// | `RELAY_BOT_TOKEN`      | `transport.token` (required)   |
    /// | `RELAY_ALLOWED_USERS`  | `access.allowed_users` (comma-separated) |
    /// | `RELAY_API_BASE`       | `transport.api_base`           |
    /// | `RELAY_WORKSPACE_ROOT` | `workspace.root`               |
    /// | `RELAY_YT_DLP`         | `tools.yt_dlp_path`            |
    /// | `RELAY_7Z`             | `tools.sevenzip_path`          |
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "failed to load .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        config.transport.token = lookup("RELAY_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config {
                message: "RELAY_BOT_TOKEN is not set".to_string(),
                key: Some("transport.token".to_string()),
            })?;

        if let Some(users) = lookup("RELAY_ALLOWED_USERS") {
            config.access.allowed_users = parse_user_list(&users)?;
        }
        if let Some(base) = lookup("RELAY_API_BASE") {
            config.transport.api_base = base;
        }
        if let Some(root) = lookup("RELAY_WORKSPACE_ROOT") {
            config.workspace.root = PathBuf::from(root);
        }
        if let Some(path) = lookup("RELAY_YT_DLP") {
            config.tools.yt_dlp_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("RELAY_7Z") {
            config.tools.sevenzip_path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        if self.transport.token.trim().is_empty() {
            return Err(Error::Config {
                message: "bot token must not be empty".to_string(),
                key: Some("transport.token".to_string()),
            });
        }
        if self.partition.part_size_bytes == 0 {
            return Err(Error::Config {
                message: "part size must be greater than zero".to_string(),
                key: Some("partition.part_size_bytes".to_string()),
            });
        }
        if self.partition.part_size_bytes >= self.transport.max_payload_bytes {
            return Err(Error::Config {
                message: format!(
                    "part size {} must be below the transport ceiling {}",
                    self.partition.part_size_bytes, self.transport.max_payload_bytes
                ),
                key: Some("partition.part_size_bytes".to_string()),
            });
        }
        if self.upload.timeout.is_zero() {
            return Err(Error::Config {
                message: "upload timeout must be greater than zero".to_string(),
                key: Some("upload.timeout".to_string()),
            });
        }
        Ok(())
    }
}

fn parse_user_list(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|e| Error::Config {
                message: format!("invalid user id {s:?}: {e}"),
                key: Some("access.allowed_users".to_string()),
            })
        })
        .collect()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_max_payload() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_direct_threshold() -> u64 {
    50 * 1024 * 1024
}

fn default_output_template() -> String {
    "%(title)s.%(ext)s".to_string()
}

fn default_merge_format() -> String {
    "mkv".to_string()
}

fn default_rate_limit() -> String {
    "50M".to_string()
}

fn default_socket_timeout() -> u32 {
    30
}

fn default_retries() -> u32 {
    10
}

fn default_extractor_retries() -> u32 {
    5
}

fn default_media_extensions() -> Vec<String> {
    ["mkv", "mp4", "webm", "m4a", "mp3", "mov"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// 1.9 GiB, leaves headroom under the 2 GiB ceiling for multipart framing
fn default_part_size() -> u64 {
    (19 * 1024 * 1024 * 1024) / 10
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("./temp_downloads")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
