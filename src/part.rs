use std::path::{Path, PathBuf};

use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, copy},
};
use tracing::{debug, info, instrument};

use crate::error::{DownloadError, Result};
use crate::progress::format_bytes;

/// A contiguous, non-empty byte range of the remote file, identified by an integer
/// from 0. `downloaded` flips false -> true exactly once, under the orchestrator's
/// mutex discipline; the planner only ever produces it as `false`.
#[derive(Clone, Debug)]
pub struct FilePart {
    pub number: usize,
    pub start: u64,
    pub end: u64,
    pub downloaded: bool,
}

impl FilePart {
    /// `end - start + 1`, the part's exact byte count.
    pub fn expected_size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `<output_basename>.<N>.part` in `output`'s directory.
    pub fn path(&self, output: &Path) -> PathBuf {
        part_path(output, self.number)
    }
}

/// Builds the on-disk path for part `number` of `output`.
pub fn part_path(output: &Path, number: usize) -> PathBuf {
    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    let base_name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dir.join(format!("{base_name}.{number}.part"))
}

/// Plans the byte ranges for a `total`-byte resource split into `part_size`-byte
/// parts. `start_i = i * part_size`, `end_i = min(start_i + part_size - 1, total - 1)`,
/// stopping at the first part whose `end` reaches `total - 1`. `total == 0` yields the
/// empty list. `part_size` must be strictly positive.
pub fn plan_parts(total: u64, part_size: u64) -> Result<Vec<FilePart>> {
    if part_size == 0 {
        return Err(DownloadError::InvalidArgument(
            "part size must be positive".to_string(),
        ));
    }
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut parts = Vec::new();
    let mut number = 0usize;
    let mut start = 0u64;

    loop {
        let end = (start + part_size - 1).min(total - 1);
        parts.push(FilePart {
            number,
            start,
            end,
            downloaded: false,
        });
        if end >= total - 1 {
            break;
        }
        start = end + 1;
        number += 1;
    }

    debug!(
        total,
        part_size,
        num_parts = parts.len(),
        "Planned parts"
    );
    Ok(parts)
}

/// Concatenates part files in ascending part-number order into `output`, streaming
/// (never loading a whole part in memory). Part files are deleted only after the
/// entire concatenation succeeds; a mid-concatenation error leaves every part file
/// intact so the next run can resume.
#[instrument(skip(parts), fields(output = ?output, num_parts = parts.len()))]
pub async fn concatenate(output: &Path, parts: &[FilePart]) -> Result<u64> {
    info!("Concatenating parts into final file");

    let mut sorted = parts.to_vec();
    sorted.sort_by_key(|p| p.number);

    let mut out = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output)
        .await?;

    let mut total_written: u64 = 0;
    for part in &sorted {
        let path = part.path(output);
        debug!(part = part.number, path = ?path, "Appending part");
        let mut f = File::open(&path).await?;
        let copied = copy(&mut f, &mut out).await?;
        total_written += copied;
    }
    out.flush().await?;

    info!(
        total_written,
        total_human = %format_bytes(total_written),
        "Concatenation completed"
    );

    for part in &sorted {
        let path = part.path(output);
        fs::remove_file(&path).await?;
    }

    Ok(total_written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_total_yields_no_parts() {
        assert!(plan_parts(0, 10).unwrap().is_empty());
    }

    #[test]
    fn zero_part_size_is_rejected() {
        assert!(plan_parts(100, 0).is_err());
    }

    #[test]
    fn total_equal_to_part_size_yields_one_part() {
        let parts = plan_parts(10, 10).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].start, 0);
        assert_eq!(parts[0].end, 9);
    }

    #[test]
    fn total_one_byte_more_than_part_size_yields_two_parts_second_len_one() {
        let parts = plan_parts(11, 10).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!((parts[0].start, parts[0].end), (0, 9));
        assert_eq!((parts[1].start, parts[1].end), (10, 10));
        assert_eq!(parts[1].expected_size(), 1);
    }

    #[test]
    fn parts_are_contiguous_and_cover_total_with_no_gaps_or_overlaps() {
        let total = 26_214_400u64; // 25 MiB
        let part_size = 10 * 1024 * 1024u64;
        let parts = plan_parts(total, part_size).unwrap();
        assert_eq!(parts.len(), 3);

        let sum: u64 = parts.iter().map(|p| p.expected_size()).sum();
        assert_eq!(sum, total);

        for i in 1..parts.len() {
            assert_eq!(parts[i].start, parts[i - 1].end + 1);
        }
        assert_eq!(parts.first().unwrap().start, 0);
        assert_eq!(parts.last().unwrap().end, total - 1);

        // last part is the only one allowed to be short
        assert_eq!(parts[0].expected_size(), part_size);
        assert_eq!(parts[1].expected_size(), part_size);
        assert_eq!(parts[2].expected_size(), 5 * 1024 * 1024);
    }

    #[test]
    fn part_numbers_are_contiguous_from_zero() {
        let parts = plan_parts(100, 9).unwrap();
        for (i, p) in parts.iter().enumerate() {
            assert_eq!(p.number, i);
        }
    }

    #[test]
    fn part_path_naming() {
        let output = Path::new("/tmp/downloads/movie.mp4");
        let p = FilePart {
            number: 3,
            start: 0,
            end: 1,
            downloaded: false,
        };
        assert_eq!(p.path(output), Path::new("/tmp/downloads/movie.mp4.3.part"));
    }

    #[tokio::test]
    async fn concatenate_reconstructs_exact_bytes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");

        let parts = vec![
            FilePart { number: 0, start: 0, end: 2, downloaded: true },
            FilePart { number: 1, start: 3, end: 5, downloaded: true },
        ];
        fs::write(parts[0].path(&output), b"abc").await.unwrap();
        fs::write(parts[1].path(&output), b"def").await.unwrap();

        let written = concatenate(&output, &parts).await.unwrap();
        assert_eq!(written, 6);

        let contents = fs::read(&output).await.unwrap();
        assert_eq!(contents, b"abcdef");

        assert!(fs::metadata(parts[0].path(&output)).await.is_err());
        assert!(fs::metadata(parts[1].path(&output)).await.is_err());
    }

    #[tokio::test]
    async fn concatenate_leaves_part_files_on_mid_failure() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");

        let parts = vec![
            FilePart { number: 0, start: 0, end: 2, downloaded: true },
            FilePart { number: 1, start: 3, end: 5, downloaded: true },
        ];
        fs::write(parts[0].path(&output), b"abc").await.unwrap();
        // part 1 deliberately missing -> concatenate must fail without touching part 0

        let err = concatenate(&output, &parts).await;
        assert!(err.is_err());
        assert!(fs::metadata(parts[0].path(&output)).await.is_ok());
    }
}
