use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::Args;

/// Initializes the tracing subscriber for logging, driven by the `--verbose`,
/// `--debug`, `--debug-proxy`, and `--json-output` flags.
///
/// Base level is WARN; `--verbose` raises it to INFO, `--debug` to DEBUG (with
/// target/file/line annotations). `--debug-proxy` layers a DEBUG directive onto the
/// `proxy`/`http` targets specifically, without forcing full `--debug` verbosity
/// elsewhere. `--json-output` switches the formatter to structured JSON lines on
/// stderr, for automation to consume instead of the human-oriented default.
pub fn init_tracing(args: &Args) {
    let base_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    let mut filter = EnvFilter::new(base_level);
    if args.debug_proxy {
        filter = filter
            .add_directive("proxy=debug".parse().unwrap())
            .add_directive("http=debug".parse().unwrap());
    }

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if args.json_output {
        builder.json().init();
    } else if args.debug {
        builder
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        builder.with_target(false).without_time().init();
    }
}
