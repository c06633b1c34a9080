use std::path::PathBuf;

/// Unified error type for the downloader.
///
/// Variants mirror the error kinds named by the design: fatal startup/shutdown errors
/// propagate to `main` as-is, while everything reachable from inside a worker's
/// part-attempt loop is handled locally and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("proxy list at {path:?} is empty")]
    NoProxies { path: PathBuf },

    #[error("no proxies available in pool")]
    NoProxiesAvailable,

    #[error("release called for worker {worker:?} which holds no proxy")]
    NoAssignment { worker: String },

    #[error("failed to determine file size after {attempts} attempts: {source}")]
    ProbeExhausted {
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },

    #[error("probe failed: {0}")]
    ProbeFailed(String),

    #[error("output file {path:?} already exists (use --overwrite)")]
    OutputExists { path: PathBuf },

    #[error("size drift: ledger says {stored} bytes, server now reports {probed} bytes (link probably expired)")]
    SizeDrift { stored: u64, probed: u64 },

    #[error("unexpected status {status} for range request")]
    UnexpectedStatus { status: u16 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DownloadError>;
