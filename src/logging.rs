//! `tracing` subscriber installation.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{CacheError, Result};

/// Installs a global `tracing` subscriber filtered by `filter`
/// (`"info"`, `"wbcache=debug"`, ...).
pub fn init_logging(filter: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(filter).map_err(|_| CacheError::Invalid("invalid log filter"))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| CacheError::Invalid("logging already initialized"))
}
