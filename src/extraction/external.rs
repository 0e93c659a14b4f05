use super::{ArchiveKind, collect_files, failed};
use crate::error::ExtractionError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Unpack tar/gz/bz2 with `7z x <archive> -o<dest> -y`.
///
/// A compressed tarball unpacks to a `.tar` first; that inner tar is unpacked
/// in a second pass and then removed.
pub(super) async fn extract(
    binary: &Path,
    kind: ArchiveKind,
    archive: &Path,
    dest: &Path,
) -> Result<Vec<PathBuf>, ExtractionError> {
    run(binary, archive, dest).await?;

    if matches!(kind, ArchiveKind::Gzip | ArchiveKind::Bzip2) {
        let inner: Vec<PathBuf> = collect(archive, dest)
            .await?
            .into_iter()
            .filter(|p| {
                p.extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("tar"))
            })
            .collect();
        for tar in inner {
            run(binary, &tar, dest).await?;
            tokio::fs::remove_file(&tar)
                .await
                .map_err(|e| failed(archive, format!("cannot remove {}: {e}", tar.display())))?;
        }
    }

    collect(archive, dest).await
}

async fn run(binary: &Path, archive: &Path, dest: &Path) -> Result<(), ExtractionError> {
    let mut out_flag = std::ffi::OsString::from("-o");
    out_flag.push(dest.as_os_str());

    debug!(?binary, ?archive, ?dest, "running 7z x");
    let output = Command::new(binary)
        .arg("x")
        .arg(archive)
        .arg(out_flag)
        .arg("-y")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| failed(archive, format!("failed to execute {}: {e}", binary.display())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let diagnostic = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(failed(
            archive,
            format!("7z exited with {}: {diagnostic}", output.status),
        ));
    }
    Ok(())
}

async fn collect(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let dir = dest.to_path_buf();
    tokio::task::spawn_blocking(move || collect_files(&dir))
        .await
        .map_err(|e| failed(archive, format!("listing task panicked: {e}")))?
        .map_err(|e| failed(archive, e.to_string()))
}
