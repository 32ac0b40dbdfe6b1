//! Logging setup.
//!
//! Logs go to stderr so structured output on stdout stays parseable.
//! `RUST_LOG` wins over the verbosity flag.

use tracing_subscriber::EnvFilter;

/// Default filter for a `-v` count
pub fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
