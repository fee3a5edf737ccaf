//! Structured logging setup shared by the server and the CLI

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use ridgeline_core::config::{LogFormat, LoggingConfig};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    // A second call (tests, embedding) keeps the first subscriber
    let _ = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    tracing::debug!(level = config.level.as_str(), "Logging initialized");
}
