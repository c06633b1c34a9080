use std::path::Path;

use futures::StreamExt;
use reqwest::{Client, header::RANGE};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, instrument};

use crate::error::DownloadError;
use crate::progress::ProgressSink;

/// A failed fetch, carrying how many bytes had already been tee'd to the progress
/// sink before the failure — the orchestrator needs this to issue a matching refund
/// (spec's progress-sink discipline: the displayed total always equals the on-disk
/// complete-bytes total).
#[derive(Debug)]
pub struct FetchError {
    pub bytes_written: u64,
    pub source: DownloadError,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for FetchError {}

/// Downloads one byte range (`start..=end`) of `url` through `client` (already scoped
/// to whichever proxy the caller assigned) to `dest`, tee-ing byte counts to
/// `progress` as they arrive.
///
/// Requires response status 206 Partial Content; any other status fails with
/// `UnexpectedStatus` and `dest` is left for the caller to clean up. Does *not*
/// verify that the bytes written match `end - start + 1` — that's the orchestrator's
/// job, since this function can't tell a size mismatch apart from a dropped
/// connection that simply stopped sending bytes.
#[instrument(skip(client, progress), fields(start, end))]
pub async fn fetch_range(
    client: &Client,
    url: &str,
    dest: &Path,
    start: u64,
    end: u64,
    progress: &dyn ProgressSink,
) -> Result<u64, FetchError> {
    let mut file = File::create(dest)
        .await
        .map_err(|e| FetchError { bytes_written: 0, source: e.into() })?;

    let range = format!("bytes={start}-{end}");
    let resp = client
        .get(url)
        .header(RANGE, range)
        .send()
        .await
        .map_err(|e| FetchError { bytes_written: 0, source: e.into() })?;

    if resp.status().as_u16() != 206 {
        return Err(FetchError {
            bytes_written: 0,
            source: DownloadError::UnexpectedStatus { status: resp.status().as_u16() },
        });
    }

    let mut stream = resp.bytes_stream();
    let mut written = 0u64;

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                if let Err(e) = file.write_all(&chunk).await {
                    return Err(FetchError { bytes_written: written, source: e.into() });
                }
                written += chunk.len() as u64;
                progress.add(chunk.len() as i64);
            }
            Some(Err(e)) => {
                return Err(FetchError { bytes_written: written, source: e.into() });
            }
            None => break,
        }
    }

    if let Err(e) = file.flush().await {
        return Err(FetchError { bytes_written: written, source: e.into() });
    }

    debug!(written, "Part stream completed");
    Ok(written)
}
