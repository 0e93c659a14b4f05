//! Error types for relay-dl
//!
//! Each pipeline stage has its own error type so the scheduler can tell the
//! requester exactly which stage failed:
//! - [`FetchError`] - the external downloader failed or produced nothing
//! - [`PartitionError`] - the archiver failed or produced no usable parts
//! - [`UploadError`] - an upload unit timed out or was rejected
//! - [`WorkspaceError`] - the scratch directory could not be prepared or purged
//!
//! Everything converges on [`Error`] through `#[from]` conversions.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for relay-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for relay-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "part_size_bytes")
        key: Option<String>,
    },

    /// Fetch stage failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Partition stage failed
    #[error("partition error: {0}")]
    Partition(#[from] PartitionError),

    /// Upload of a unit failed
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Workspace could not be prepared or cleaned
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Messaging transport call failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Archive extraction failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// External tool execution failed (yt-dlp, 7z)
    #[error("external tool error: {0}")]
    ExternalTool(String),
}

/// Errors from the fetch stage
#[derive(Debug, Error)]
pub enum FetchError {
    /// The downloader binary could not be started
    #[error("failed to execute {tool}: {reason}")]
    Spawn {
        /// Tool that failed to start
        tool: String,
        /// OS-level reason
        reason: String,
    },

    /// The source demanded authentication (usually missing or stale cookies)
    #[error("authentication required: {diagnostic}")]
    AuthRequired {
        /// Diagnostic text from the tool's error stream
        diagnostic: String,
    },

    /// The downloader exited with a non-zero status
    #[error("downloader exited with {status}: {diagnostic}")]
    ToolFailed {
        /// Exit status as reported by the OS (e.g. "exit status: 1")
        status: String,
        /// Diagnostic text from the tool's error stream, verbatim
        diagnostic: String,
    },

    /// The downloader succeeded but no media file could be found
    #[error("no downloaded media file found in {dir}")]
    NoArtifact {
        /// Directory that was scanned
        dir: PathBuf,
    },

    /// A local source path does not exist or is not a regular file
    #[error("source file not found: {path}")]
    SourceMissing {
        /// Path the requester referenced
        path: PathBuf,
    },
}

/// Errors from the partition stage
#[derive(Debug, Error)]
pub enum PartitionError {
    /// The archiver binary could not be started
    #[error("failed to execute {tool}: {reason}")]
    Spawn {
        /// Tool that failed to start
        tool: String,
        /// OS-level reason
        reason: String,
    },

    /// The archiver exited with a non-zero status
    #[error("archiver exited with {status}: {diagnostic}")]
    ToolFailed {
        /// Exit status as reported by the OS
        status: String,
        /// Diagnostic text from the tool's output
        diagnostic: String,
    },

    /// Splitting finished but no parts were found
    #[error("no parts produced for {base}")]
    NoParts {
        /// Archive base name that was searched for
        base: String,
    },

    /// Volume numbering has a gap
    #[error("part {missing} of {base} is missing")]
    NonContiguous {
        /// Archive base name
        base: String,
        /// First missing volume number
        missing: u32,
    },

    /// Part size budget is unusable
    #[error("invalid part size {part_size} for ceiling {ceiling}")]
    InvalidPartSize {
        /// Requested part size in bytes
        part_size: u64,
        /// Transport ceiling in bytes
        ceiling: u64,
    },

    /// I/O failure while segmenting or enumerating
    #[error("I/O error while splitting {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Errors from uploading a single unit
#[derive(Debug, Error)]
pub enum UploadError {
    /// The per-unit deadline elapsed
    #[error("upload of {name} timed out after {secs}s")]
    Timeout {
        /// File name of the unit
        name: String,
        /// Deadline in seconds
        secs: u64,
    },

    /// The transport refused or failed the upload
    #[error("upload of {name} failed: {source}")]
    Transport {
        /// File name of the unit
        name: String,
        /// Underlying transport error
        #[source]
        source: TransportError,
    },
}

/// Errors preparing or cleaning a workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The workspace directory could not be created
    #[error("failed to create workspace {path}: {source}")]
    Create {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Removing workspace contents failed
    #[error("failed to purge workspace {path}: {source}")]
    Purge {
        /// Path that could not be removed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A path escapes the workspace
    #[error("path {path} is outside the workspace")]
    OutsideWorkspace {
        /// Offending path
        path: PathBuf,
    },

    /// A requested path does not exist
    #[error("path {path} does not exist")]
    NotFound {
        /// Missing path
        path: PathBuf,
    },
}

/// Errors from the messaging transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP-level failure (connect, timeout, body)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API answered but refused the call
    #[error("rejected by API (HTTP {status}): {description}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Description returned by the API
        description: String,
    },

    /// Local file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The API answered with something unexpected
    #[error("malformed API response: {0}")]
    Malformed(String),
}

/// Errors from archive extraction
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File name does not map to a supported archive kind
    #[error("unsupported archive format: {name}")]
    Unsupported {
        /// File name that could not be classified
        name: String,
    },

    /// Decoder failed
    #[error("extraction failed for {archive}: {reason}")]
    Failed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },
}

impl FetchError {
    /// Short label for summaries
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Spawn { .. } => "tool unavailable",
            FetchError::AuthRequired { .. } => "authentication required",
            FetchError::ToolFailed { .. } => "tool failed",
            FetchError::NoArtifact { .. } => "no file produced",
            FetchError::SourceMissing { .. } => "source missing",
        }
    }
}
