//! Logging initialization for the CLI.
//!
//! Library crates only emit `tracing` events; the subscriber lives here.
//! Logs go to stderr so reports on stdout stay machine-readable.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber.
///
/// `verbosity`: 0 = `RUST_LOG` or `warn`, 1 = debug for origin crates, 2+ = trace.
pub fn init(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("warn,origin=debug,origin_pm=debug"),
        _ => EnvFilter::new("trace"),
    };

    // A subscriber may already be installed (e.g. in tests)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
