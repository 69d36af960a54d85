//! Tracing subscriber setup for the `sqlload` binary.

use tracing_subscriber::EnvFilter;

/// Default filter directive for a verbosity level (`-v` count).
#[must_use]
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "sqlload=info",
        1 => "sqlload=debug",
        _ => "sqlload=trace",
    }
}

/// Install a stderr `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `verbosity` when set and valid.  Calling
/// this more than once is harmless; later calls keep the first subscriber.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
