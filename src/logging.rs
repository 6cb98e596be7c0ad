//! Logging configuration for birdeval.
//!
//! Progress and per-row warnings go to stdout so they interleave with the
//! score table the reporter prints.

use tracing_subscriber::EnvFilter;

/// Initializes logging on stdout.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects `debug` over `info`.
pub fn init_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level(verbose))),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();
}

/// Returns the filter used when `RUST_LOG` is not set.
pub fn default_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}
