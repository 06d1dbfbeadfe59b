use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

/// Progress to stdout, warnings and errors to stderr. `RUST_LOG` overrides
/// the default `info` filter.
pub fn init() -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);
    let layer = fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
}
