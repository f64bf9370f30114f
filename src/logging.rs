//! Tracing subscriber setup for the CLI.

use tracing_subscriber::EnvFilter;

/// Install a stderr fmt subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `info`, or `debug` for this crate
/// when `verbose` is set. Calling it twice is harmless.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "info,threadwise=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
