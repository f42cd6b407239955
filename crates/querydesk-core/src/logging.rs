//! Tracing subscriber setup shared by querydesk binaries.

use tracing_subscriber::EnvFilter;

use crate::error::{QuerydeskError, Result};

/// Build the env filter: `RUST_LOG` wins, otherwise the given level.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global fmt subscriber, writing to stderr.
///
/// Stdout is left untouched so binaries can use it as a data channel.
pub fn init_tracing(default_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| QuerydeskError::Logging(e.to_string()))
}
