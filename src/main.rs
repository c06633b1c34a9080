use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use rangehopper::cli::Args;
use rangehopper::config::Config;
use rangehopper::progress::{BarProgressSink, JsonProgressSink, ProgressSink};
use rangehopper::{error, logging, orchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_tracing(&args);

    let json_output = args.json_output;
    let config = Config::from_args(args)?;

    info!(url = %config.url, "Starting download");

    // A placeholder sink covers startup logging; the real sized bar is installed once
    // the probe resolves total size, inside the orchestrator. For JSON mode there's
    // nothing to resize, so it's built once up front.
    let progress: Arc<dyn ProgressSink> = if json_output {
        Arc::new(JsonProgressSink::new())
    } else {
        Arc::new(BarProgressSink::new(0))
    };

    // Cancellation isn't supported inside the core: a Ctrl-C just lets in-flight
    // fetches die on socket close and prints a clean message before exiting. The
    // info file and any valid part files are untouched and will be picked up by the
    // next run.
    tokio::select! {
        result = orchestrator::run(config, progress) => {
            match result {
                Ok(()) => Ok(()),
                Err(error::DownloadError::OutputExists { path }) => {
                    info!(path = ?path, "Output already exists, nothing to do");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; re-run with the same arguments to resume");
            Ok(())
        }
    }
}
