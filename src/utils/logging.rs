//! Logging init: fmt subscriber on stderr, filtered by `RUST_LOG` or the CLI verbosity

use tracing_subscriber::EnvFilter;

/// Default filter for a given `-v` count
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,vidqueue=info",
        1 => "info,vidqueue=debug",
        _ => "debug,vidqueue=trace",
    }
}

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init_logging(verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
