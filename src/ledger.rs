use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{DownloadError, Result};

/// On-disk resume ledger: `<output_basename>.info.txt` in the output directory,
/// holding the probed total size as decimal ASCII. Its presence across runs is the
/// signal "a download is in progress or was interrupted".
pub fn info_path(output: &Path) -> PathBuf {
    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    let base_name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dir.join(format!("{base_name}.info.txt"))
}

/// Ensures the ledger for `output` agrees with the newly probed `total`.
///
/// If the info file doesn't exist, creates it with `total` and returns its path. If
/// it exists, its stored value must match `total` exactly or this fails with
/// `SizeDrift` (the link probably expired between runs).
pub async fn ensure(output: &Path, total: u64) -> Result<PathBuf> {
    let path = info_path(output);

    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            let stored: u64 = contents
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .parse()
                .map_err(|_| {
                    DownloadError::InvalidArgument(format!(
                        "ledger at {path:?} does not contain a valid integer"
                    ))
                })?;
            if stored != total {
                return Err(DownloadError::SizeDrift { stored, probed: total });
            }
            info!(path = ?path, total, "Resuming existing download");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::write(&path, total.to_string()).await?;
            debug!(path = ?path, total, "Created resume ledger");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(path)
}

/// Deletes the ledger. Called by the orchestrator after the final concatenation and
/// size verification succeed.
pub async fn delete(output: &Path) -> Result<()> {
    let path = info_path(output);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
