//! Tracing subscriber setup for embedders that want a default logger

use tracing_subscriber::EnvFilter;

use crate::utils::{PipelineError, Result};

/// Install a global fmt subscriber.
///
/// The filter comes from `RUST_LOG` when set, falling back to `default_level`
/// (for example `"draftgate=info"`). Fails if a global subscriber is already
/// installed.
pub fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| PipelineError::Config(format!("Invalid log filter: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| PipelineError::Config(format!("Failed to install subscriber: {e}")))?;

    Ok(())
}
