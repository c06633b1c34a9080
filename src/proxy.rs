use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use rand::seq::SliceRandom;
use tracing::{debug, instrument, warn};

use crate::error::{DownloadError, Result};

/// Reads a proxy list file: one proxy URL per line, blank lines skipped, no comments.
///
/// Each non-blank line must parse as a URL (`scheme://[user:pass@]host:port`); lines
/// that don't are rejected rather than silently dropped, since a malformed proxy line
/// is almost always a typo the user wants to know about.
#[instrument]
pub async fn load_proxies(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path).await?;

    let mut proxies = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        url::Url::parse(line).map_err(|e| {
            DownloadError::InvalidArgument(format!("invalid proxy URL {line:?}: {e}"))
        })?;
        proxies.push(line.to_string());
    }

    debug!(count = proxies.len(), path = ?path, "Loaded proxy list");
    Ok(proxies)
}

struct PoolInner {
    queue: VecDeque<String>,
    assigned: HashMap<String, String>,
    error_count: u64,
}

/// Rotating pool of proxy endpoints.
///
/// Assigns at most one proxy per worker identity at a time. `Fail` sends a worker's
/// current proxy to the back of the queue (suspected bad, pay retry cost first);
/// `Release` sends it to the front (known good, reuse immediately). All three
/// operations run under a single mutex so the queue, the assignment map, and the
/// error counter are always updated as one atomic unit.
pub struct ProxyPool {
    inner: Mutex<PoolInner>,
}

impl ProxyPool {
    /// Builds a pool from the given endpoints, shuffled uniformly at random.
    pub fn new(mut endpoints: Vec<String>) -> Self {
        let mut rng = rand::thread_rng();
        endpoints.shuffle(&mut rng);
        Self {
            inner: Mutex::new(PoolInner {
                queue: endpoints.into(),
                assigned: HashMap::new(),
                error_count: 0,
            }),
        }
    }

    /// Returns the proxy currently held by `worker`, or assigns the next one from the
    /// head of the queue. Idempotent: calling twice for the same unreleased worker
    /// returns the same endpoint both times.
    pub fn assign(&self, worker: &str) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(endpoint) = inner.assigned.get(worker) {
            return Ok(endpoint.clone());
        }
        let endpoint = inner
            .queue
            .pop_front()
            .ok_or(DownloadError::NoProxiesAvailable)?;
        inner.assigned.insert(worker.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    /// Marks `worker`'s current proxy (if any) as suspected bad: it goes to the tail
    /// of the queue, `error_count` increments, and a fresh assignment is handed out.
    /// If `worker` held nothing, behaves exactly like `assign`.
    pub fn fail(&self, worker: &str) -> Result<String> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(endpoint) = inner.assigned.remove(worker) {
                inner.error_count += 1;
                warn!(worker, endpoint, error_count = inner.error_count, "Proxy failed over");
                inner.queue.push_back(endpoint);
            }
        }
        self.assign(worker)
    }

    /// Releases `worker`'s current proxy back to the head of the queue for immediate
    /// reuse. Fails with `NoAssignment` if `worker` held nothing.
    pub fn release(&self, worker: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let endpoint = inner
            .assigned
            .remove(worker)
            .ok_or_else(|| DownloadError::NoAssignment {
                worker: worker.to_string(),
            })?;
        inner.queue.push_front(endpoint);
        Ok(())
    }

    /// Total number of `fail` events observed so far. Observational only.
    pub fn error_count(&self) -> u64 {
        self.inner.lock().unwrap().error_count
    }

    /// Number of proxies currently idle in the queue (not assigned to any worker).
    #[cfg(test)]
    pub fn queue_len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// Number of proxies currently assigned to some worker.
    #[cfg(test)]
    pub fn assigned_len(&self) -> usize {
        self.inner.lock().unwrap().assigned.len()
    }
}
