//! Tracing subscriber setup for the binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`
/// (default `info,csv_rag=debug` with `verbose`, `warn` otherwise).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "info,csv_rag=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init();
}
