use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{DownloadError, Result};
use crate::fetch::fetch_range;
use crate::http::{self, probe};
use crate::ledger;
use crate::part::{self, FilePart};
use crate::progress::ProgressSink;
use crate::proxy::{self, ProxyPool};

/// Number of direct (no-proxy) probe attempts before giving up with `ProbeExhausted`.
const PROBE_ATTEMPTS: u32 = 3;

/// A FIFO work queue shared by the bounded worker set. Plain `std::sync::Mutex`
/// rather than an async one: pops are non-blocking and held only for the length of a
/// `Vec`/`VecDeque` operation, the same discipline as the Proxy Pool.
struct WorkQueue {
    pending: Mutex<VecDeque<usize>>,
}

impl WorkQueue {
    fn new(len: usize) -> Self {
        Self { pending: Mutex::new((0..len).collect()) }
    }

    fn pop(&self) -> Option<usize> {
        self.pending.lock().unwrap().pop_front()
    }
}

/// Tracks which parts have completed. One mutex, matching the spec's discipline that
/// the `downloaded` flag flip and its paired progress-sink update are serialised
/// together.
struct PartsState {
    parts: Mutex<Vec<FilePart>>,
}

impl PartsState {
    fn mark_downloaded(&self, number: usize) {
        let mut parts = self.parts.lock().unwrap();
        parts[number].downloaded = true;
    }

    fn snapshot(&self) -> Vec<FilePart> {
        self.parts.lock().unwrap().clone()
    }
}

/// Runs the full download: probe, plan, schedule, fetch, resume, concatenate, verify.
pub async fn run(config: Config, progress: Arc<dyn ProgressSink>) -> Result<()> {
    let proxies = proxy::load_proxies(&config.proxies_file).await?;
    if proxies.is_empty() {
        return Err(DownloadError::NoProxies { path: config.proxies_file.clone() });
    }
    let pool = Arc::new(ProxyPool::new(proxies.clone()));

    let mut max_concurrent = config.max_concurrent;
    if max_concurrent > proxies.len() {
        warn!(
            requested = max_concurrent,
            available = proxies.len(),
            "Clamping max_concurrent to number of proxies"
        );
        max_concurrent = proxies.len();
    }

    let direct_client = http::client_builder().build()?;
    let probed = probe_with_retries(&direct_client, &config.url).await?;
    info!(
        content_length = probed.content_length,
        filename = %probed.filename,
        "Probed remote resource"
    );
    progress.set_total(probed.content_length);

    let mut parts = part::plan_parts(probed.content_length, config.part_size_bytes)?;
    if parts.is_empty() {
        return Err(DownloadError::InvalidArgument(
            "remote resource is empty (0 bytes)".to_string(),
        ));
    }
    if max_concurrent > parts.len() {
        warn!(
            requested = max_concurrent,
            parts = parts.len(),
            "Clamping max_concurrent to number of parts"
        );
        max_concurrent = parts.len();
    }

    let output = resolve_output(config.output.clone(), &probed.filename)?;
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if !config.overwrite && tokio::fs::metadata(&output).await.is_ok() {
        return Err(DownloadError::OutputExists { path: output });
    }

    ledger::ensure(&output, probed.content_length).await?;

    pre_check_existing_parts(&mut parts, &output, progress.as_ref()).await?;

    let parts_state = Arc::new(PartsState { parts: Mutex::new(parts) });
    let queue = Arc::new(WorkQueue::new(parts_state.snapshot().len()));

    let mut workers = JoinSet::new();
    for worker_index in 0..max_concurrent {
        let parts_state = Arc::clone(&parts_state);
        let queue = Arc::clone(&queue);
        let pool = Arc::clone(&pool);
        let progress = Arc::clone(&progress);
        let url = config.url.clone();
        let output = output.clone();
        let max_retries = config.max_retries;

        workers.spawn(async move {
            worker_loop(
                worker_index,
                parts_state,
                queue,
                pool,
                progress,
                url,
                output,
                max_retries,
            )
            .await
        });
    }

    while let Some(result) = workers.join_next().await {
        result.map_err(|e| DownloadError::InvalidArgument(format!("worker panicked: {e}")))??;
    }

    let final_parts = parts_state.snapshot();
    let written = part::concatenate(&output, &final_parts).await?;
    info!(written, "Wrote final output file");

    match tokio::fs::metadata(&output).await {
        Ok(meta) if meta.len() == probed.content_length => {}
        Ok(meta) => {
            error!(
                expected = probed.content_length,
                actual = meta.len(),
                "Final file size mismatch; file left in place for inspection"
            );
        }
        Err(e) => {
            error!(error = %e, "Could not stat final file after concatenation");
        }
    }

    ledger::delete(&output).await?;
    progress.finish("Download completed");

    Ok(())
}

/// Probes the URL directly (no proxy) up to `PROBE_ATTEMPTS` times, per startup step
/// 3: the probe phase has no pool to draw from yet, so it can't fail over.
async fn probe_with_retries(client: &reqwest::Client, url: &str) -> Result<http::ProbeResult> {
    let mut last_err = None;
    for attempt in 1..=PROBE_ATTEMPTS {
        match probe(client, url).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                warn!(attempt, error = %e, "Probe attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(DownloadError::ProbeExhausted {
        attempts: PROBE_ATTEMPTS,
        source: Box::new(last_err.expect("loop runs at least once")),
    })
}

/// Resolves the output path: the probed filename if none was given, made absolute.
fn resolve_output(output: Option<PathBuf>, probed_filename: &str) -> Result<PathBuf> {
    let path = output.unwrap_or_else(|| PathBuf::from(probed_filename));
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(path)
}

/// Pre-checks each part's file on disk before scheduling: a part whose file already
/// has the exact right size is marked downloaded and its bytes added to the progress
/// sink without being re-fetched; a part file of the wrong size is deleted so the
/// worker starts from a clean slate.
async fn pre_check_existing_parts(
    parts: &mut [FilePart],
    output: &PathBuf,
    progress: &dyn ProgressSink,
) -> Result<()> {
    for part in parts.iter_mut() {
        let path = part.path(output);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() == part.expected_size() => {
                part.downloaded = true;
                progress.add(part.expected_size() as i64);
            }
            Ok(_) => {
                tokio::fs::remove_file(&path).await?;
            }
            Err(_) => {}
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_index: usize,
    parts_state: Arc<PartsState>,
    queue: Arc<WorkQueue>,
    pool: Arc<ProxyPool>,
    progress: Arc<dyn ProgressSink>,
    url: String,
    output: PathBuf,
    max_retries: u32,
) -> Result<()> {
    let worker_id = worker_index.to_string();

    while let Some(part_number) = queue.pop() {
        let part = {
            let parts = parts_state.parts.lock().unwrap();
            parts[part_number].clone()
        };
        if part.downloaded {
            continue;
        }

        let dest = part.path(&output);
        let mut retry_counter = 0u32;

        loop {
            let failover = if max_retries > 0 {
                retry_counter >= max_retries
            } else {
                retry_counter > 0
            };

            let proxy_endpoint = if failover {
                let endpoint = pool.fail(&worker_id)?;
                retry_counter = 0;
                endpoint
            } else {
                pool.assign(&worker_id)?
            };

            let client = http::client_builder()
                .proxy(reqwest::Proxy::all(&proxy_endpoint)?)
                .build()?;

            match fetch_range(&client, &url, &dest, part.start, part.end, progress.as_ref()).await
            {
                Ok(_bytes_written) => {
                    let on_disk = meta_len_or_zero(&dest).await;
                    if on_disk == part.expected_size() {
                        pool.release(&worker_id)?;
                        parts_state.mark_downloaded(part.number);
                        progress.add_detail(&format!("part {} complete", part.number));
                        break;
                    } else {
                        let _ = tokio::fs::remove_file(&dest).await;
                        progress.add(-(on_disk as i64));
                        retry_counter += 1;
                    }
                }
                Err(fetch_err) => {
                    let _ = tokio::fs::remove_file(&dest).await;
                    progress.add(-(fetch_err.bytes_written as i64));
                    warn!(
                        worker = worker_id,
                        part = part.number,
                        proxy = proxy_endpoint,
                        error = %fetch_err,
                        "Part fetch failed, will retry"
                    );
                    retry_counter += 1;
                }
            }
        }
    }

    Ok(())
}

async fn meta_len_or_zero(path: &std::path::Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}
