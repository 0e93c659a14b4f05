//! Classification of downloader failures

use crate::error::FetchError;
use regex::Regex;
use std::sync::LazyLock;

static AUTH_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(sign in to confirm|login required|requires authentication|use --cookies|--cookies-from-browser|http error 40[13]|private video|members[- ]only|confirm your age|age[- ]restricted)",
    )
    .ok()
});

/// Whether the tool's error stream says the source wants credentials
pub fn is_auth_failure(diagnostic: &str) -> bool {
    AUTH_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(diagnostic))
}

/// Turn a non-zero exit into the matching [`FetchError`]
///
/// The error stream is preferred as diagnostic; standard output is used when
/// the tool wrote nothing there.
pub fn classify_failure(status: &str, stdout: &[u8], stderr: &[u8]) -> FetchError {
    let mut diagnostic = String::from_utf8_lossy(stderr).trim().to_string();
    if diagnostic.is_empty() {
        diagnostic = String::from_utf8_lossy(stdout).trim().to_string();
    }

    if is_auth_failure(&diagnostic) {
        FetchError::AuthRequired { diagnostic }
    } else {
        FetchError::ToolFailed {
            status: status.to_string(),
            diagnostic,
        }
    }
}
