use std::path::PathBuf;

use crate::cli::Args;
use crate::error::{DownloadError, Result};

const MEBIBYTE: u64 = 1024 * 1024;

/// Resolved, validated configuration built from `cli::Args`. Kept separate from the
/// raw CLI struct so unit tests (and the orchestrator itself) can construct a
/// `Config` without going through `clap`.
#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    /// `None` until the probed filename resolves it, per spec §4.6 step 5.
    pub output: Option<PathBuf>,
    pub proxies_file: PathBuf,
    pub max_concurrent: usize,
    pub part_size_bytes: u64,
    pub max_retries: u32,
    pub overwrite: bool,
    pub verbose: bool,
    pub json_output: bool,
    pub debug: bool,
    pub debug_proxy: bool,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self> {
        if args.max == 0 {
            return Err(DownloadError::InvalidArgument(
                "max must be >= 1".to_string(),
            ));
        }
        if args.part == 0 {
            return Err(DownloadError::InvalidArgument(
                "part size must be positive".to_string(),
            ));
        }

        Ok(Self {
            url: args.url,
            output: args.output,
            proxies_file: args.proxy,
            max_concurrent: args.max,
            part_size_bytes: args.part * MEBIBYTE,
            max_retries: args.retry,
            overwrite: args.overwrite,
            verbose: args.verbose,
            json_output: args.json_output,
            debug: args.debug,
            debug_proxy: args.debug_proxy,
        })
    }
}
