//! Core types for relay-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Identity of the user who issued a request (the transport's user id)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub i64);

impl PrincipalId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for PrincipalId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat that replies and uploads are addressed to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the file of a request comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// Remote locator handed to the downloader
    Remote(Url),
    /// File already on local storage
    Local(PathBuf),
}

/// One relay request
#[derive(Clone, Debug)]
pub struct TransferRequest {
    /// Who asked
    pub principal: PrincipalId,
    /// Where to report
    pub chat: ChatId,
    /// What to relay
    pub source: Source,
    /// Cookie file handed to the downloader, if the principal stored one
    pub credential: Option<PathBuf>,
}

impl TransferRequest {
    /// Create a request without credentials
    pub fn new(principal: PrincipalId, chat: ChatId, source: Source) -> Self {
        Self {
            principal,
            chat,
            source,
            credential: None,
        }
    }

    /// Attach a credential file
    pub fn with_credential(mut self, credential: Option<PathBuf>) -> Self {
        self.credential = credential;
        self
    }
}

/// A file on local storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Absolute path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Creation time (modification time where the platform lacks birth time)
    pub created: DateTime<Utc>,
}

impl Artifact {
    /// Stat `path` and build an artifact from it
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let path = tokio::fs::canonicalize(path).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(Self {
            path,
            size: metadata.len(),
            created,
        })
    }

    /// File name for captions and logs
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Ordered parts of one split artifact (part 1 first)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartSet {
    /// Name of the artifact the parts were cut from
    pub source_name: String,
    /// Parts in upload order
    pub parts: Vec<Artifact>,
}

impl PartSet {
    /// Number of parts
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the set has no parts
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Sum of all part sizes
    pub fn total_size(&self) -> u64 {
        self.parts.iter().map(|p| p.size).sum()
    }

    /// Upload units in order, captioned "Part i/N of <name>"
    pub fn units(&self, direct_threshold: u64) -> Vec<UploadUnit> {
        let total = self.parts.len();
        self.parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                UploadUnit::new(
                    part.clone(),
                    format!("Part {}/{} of {}", i + 1, total, self.source_name),
                    direct_threshold,
                )
            })
            .collect()
    }
}

/// How a unit is handed to the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// Read into memory and send in one request body
    Direct,
    /// Stream from disk
    Streamed,
}

impl UploadStrategy {
    /// Pick the strategy for a payload of `size` bytes
    pub fn for_size(size: u64, direct_threshold: u64) -> Self {
        if size > direct_threshold {
            UploadStrategy::Streamed
        } else {
            UploadStrategy::Direct
        }
    }
}

/// The atomic thing sent in one transport call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadUnit {
    /// File to send
    pub artifact: Artifact,
    /// Caption shown with the document
    pub caption: String,
    /// Direct or streamed
    pub strategy: UploadStrategy,
}

impl UploadUnit {
    /// Pair an artifact with a caption, deriving the strategy from its size
    pub fn new(artifact: Artifact, caption: impl Into<String>, direct_threshold: u64) -> Self {
        let strategy = UploadStrategy::for_size(artifact.size, direct_threshold);
        Self {
            artifact,
            caption: caption.into(),
            strategy,
        }
    }

    /// Upload unit for a whole, unsplit artifact
    pub fn whole(artifact: Artifact, direct_threshold: u64) -> Self {
        let caption = format!("Full file: {}", artifact.file_name());
        Self::new(artifact, caption, direct_threshold)
    }
}

/// Non-terminal pipeline stages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Running the downloader (or resolving a local file)
    Fetching,
    /// Comparing size against the ceiling
    SizeCheck,
    /// Uploading the whole file
    DirectUpload,
    /// Running the splitter
    Splitting,
    /// Uploading parts one by one
    PartUpload,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Fetching => "fetch",
            Stage::SizeCheck => "size check",
            Stage::DirectUpload => "upload",
            Stage::Splitting => "split",
            Stage::PartUpload => "part upload",
        };
        f.write_str(s)
    }
}

/// Terminal pipeline states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// Every unit uploaded
    Done,
    /// Some parts uploaded, then one failed
    PartialFailed,
    /// Nothing uploaded
    Failed,
}

/// Result of one upload unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Transport accepted the unit
    Success,
    /// Upload failed with the given reason
    Failed(String),
}

/// How a request ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All `units` were uploaded
    Done {
        /// Number of units uploaded
        units: usize,
    },
    /// Part `failed_unit` (1-based) failed after `completed` successes
    PartialFailed {
        /// 1-based index of the failing part
        failed_unit: usize,
        /// Parts uploaded before the failure
        completed: usize,
        /// Parts in the set
        total: usize,
        /// Failure reason
        reason: String,
    },
    /// Request failed before anything was uploaded
    Failed {
        /// Stage that failed
        stage: Stage,
        /// Failure reason
        reason: String,
    },
}

impl TransferOutcome {
    /// Terminal state of this outcome
    pub fn state(&self) -> TerminalState {
        match self {
            TransferOutcome::Done { .. } => TerminalState::Done,
            TransferOutcome::PartialFailed { .. } => TerminalState::PartialFailed,
            TransferOutcome::Failed { .. } => TerminalState::Failed,
        }
    }
}

/// Outcome of a request plus the per-unit results, in upload order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferSummary {
    /// How the request ended
    pub outcome: TransferOutcome,
    /// One entry per attempted unit
    pub units: Vec<UnitOutcome>,
}

impl TransferSummary {
    /// Terminal state
    pub fn state(&self) -> TerminalState {
        self.outcome.state()
    }

    /// Number of units that were uploaded
    pub fn completed(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u, UnitOutcome::Success))
            .count()
    }

    /// One human-readable message for the requester
    pub fn message(&self) -> String {
        match &self.outcome {
            TransferOutcome::Done { units: 1 } => "✅ File uploaded successfully.".to_string(),
            TransferOutcome::Done { units } => {
                format!("🎉 All {units} parts uploaded successfully.")
            }
            TransferOutcome::PartialFailed {
                failed_unit,
                completed,
                total,
                reason,
            } => format!(
                "❌ Upload of part {failed_unit} failed: {reason}\n{completed}/{total} completed."
            ),
            TransferOutcome::Failed { stage, reason } => {
                format!("❌ {} failed: {reason}", capitalize(&stage.to_string()))
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Event emitted during a request's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Fetch stage started
    Fetching {
        /// Requesting principal
        principal: PrincipalId,
    },
    /// Artifact is on disk
    Fetched {
        /// Requesting principal
        principal: PrincipalId,
        /// Artifact path
        path: PathBuf,
        /// Artifact size in bytes
        size: u64,
    },
    /// Splitting started
    Splitting {
        /// Requesting principal
        principal: PrincipalId,
    },
    /// Splitting finished
    Split {
        /// Requesting principal
        principal: PrincipalId,
        /// Number of parts produced
        parts: usize,
    },
    /// A unit upload started
    Uploading {
        /// Requesting principal
        principal: PrincipalId,
        /// 1-based unit index
        index: usize,
        /// Number of units
        total: usize,
    },
    /// A unit upload succeeded
    Uploaded {
        /// Requesting principal
        principal: PrincipalId,
        /// 1-based unit index
        index: usize,
        /// Number of units
        total: usize,
    },
    /// Request reached a terminal state
    Finished {
        /// Requesting principal
        principal: PrincipalId,
        /// Terminal state
        state: TerminalState,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(name: &str, size: u64) -> Artifact {
        Artifact {
            path: PathBuf::from("/ws").join(name),
            size,
            created: Utc::now(),
        }
    }

    #[test]
    fn strategy_switches_above_threshold() {
        assert_eq!(UploadStrategy::for_size(50, 50), UploadStrategy::Direct);
        assert_eq!(UploadStrategy::for_size(51, 50), UploadStrategy::Streamed);
        assert_eq!(UploadStrategy::for_size(0, 50), UploadStrategy::Direct);
    }

    #[test]
    fn whole_unit_caption_names_file() {
        let unit = UploadUnit::whole(artifact("movie.mkv", 10), 100);
        assert_eq!(unit.caption, "Full file: movie.mkv");
        assert_eq!(unit.strategy, UploadStrategy::Direct);
    }

    #[test]
    fn part_units_are_numbered_in_order() {
        let set = PartSet {
            source_name: "movie.mkv".to_string(),
            parts: vec![
                artifact("movie.7z.001", 1900),
                artifact("movie.7z.002", 1900),
                artifact("movie.7z.003", 1200),
            ],
        };
        let units = set.units(1000);
        let captions: Vec<_> = units.iter().map(|u| u.caption.as_str()).collect();
        assert_eq!(
            captions,
            [
                "Part 1/3 of movie.mkv",
                "Part 2/3 of movie.mkv",
                "Part 3/3 of movie.mkv"
            ]
        );
        assert!(units.iter().all(|u| u.strategy == UploadStrategy::Streamed));
        assert_eq!(set.total_size(), 5000);
    }

    #[test]
    fn partial_failure_message_reports_completed_over_total() {
        let summary = TransferSummary {
            outcome: TransferOutcome::PartialFailed {
                failed_unit: 2,
                completed: 1,
                total: 3,
                reason: "timed out".to_string(),
            },
            units: vec![UnitOutcome::Success, UnitOutcome::Failed("timed out".to_string())],
        };
        assert_eq!(summary.state(), TerminalState::PartialFailed);
        assert_eq!(summary.completed(), 1);
        assert!(summary.message().contains("1/3 completed"));
        assert!(summary.message().contains("part 2"));
    }

    #[test]
    fn failed_message_names_stage() {
        let summary = TransferSummary {
            outcome: TransferOutcome::Failed {
                stage: Stage::Fetching,
                reason: "boom".to_string(),
            },
            units: vec![],
        };
        assert_eq!(summary.message(), "❌ Fetch failed: boom");
    }

    #[tokio::test]
    async fn artifact_from_path_reads_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mkv");
        std::fs::write(&path, b"0123456789").unwrap();

        let artifact = Artifact::from_path(&path).await.unwrap();
        assert_eq!(artifact.size, 10);
        assert!(artifact.path.is_absolute());
        assert_eq!(artifact.file_name(), "clip.mkv");
    }

    #[tokio::test]
    async fn artifact_from_path_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Artifact::from_path(dir.path()).await.is_err());
    }
}
