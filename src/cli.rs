use clap::Parser;
use std::path::PathBuf;

/// Concurrent ranged downloader that rotates each part through a pool of proxies.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Download URL.
    pub url: String,

    /// Output file path (if not provided, derived from the probed filename).
    #[arg(long, short = 'O')]
    pub output: Option<PathBuf>,

    /// Path to the proxy list file (one proxy URL per line).
    #[arg(long, short = 'x', default_value = "proxies.txt")]
    pub proxy: PathBuf,

    /// Maximum number of concurrent workers (clamped to min(proxies, parts)).
    #[arg(long, default_value_t = 30)]
    pub max: usize,

    /// Part size in mebibytes.
    #[arg(long, default_value_t = 10)]
    pub part: u64,

    /// Failover threshold: retries on the same proxy before rotating to the next one.
    #[arg(long, default_value_t = 2)]
    pub retry: u32,

    /// Overwrite the output file if it already exists.
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Verbose (info-level) logging.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    /// Emit newline-delimited JSON progress/log events instead of a progress bar.
    #[arg(long = "json-output", default_value_t = false)]
    pub json_output: bool,

    /// Debug-level logging.
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Debug-level logging scoped to proxy assignment/rotation only.
    #[arg(long = "debug-proxy", default_value_t = false)]
    pub debug_proxy: bool,
}
