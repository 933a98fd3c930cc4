//! Tracing subscriber setup for binaries and demos embedding the client.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

fn filter(quiet: bool) -> EnvFilter {
    let default = if quiet { "warn" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install a human-readable subscriber on stderr.
///
/// `RUST_LOG` overrides the default level (`info`, or `warn` when `quiet`).
/// Does nothing if a global subscriber is already set.
pub fn init_logging(quiet: bool) {
    let _ = fmt()
        .with_env_filter(filter(quiet))
        .with_writer(std::io::stderr)
        .try_init();
}

/// Install a JSON subscriber on stderr, one object per event.
pub fn init_json_logging() {
    let layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter(false))
        .with(layer)
        .try_init();
}
