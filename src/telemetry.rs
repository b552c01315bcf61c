//! Diagnostics for the library itself.
//!
//! Log lines produced by [`crate::logger::StructuredLogger`] go to its sink.
//! Everything the library reports about its own operation (failed
//! deliveries, dropped broadcasts, pipeline setup) goes through `tracing`,
//! and this module installs a subscriber that writes those events to stderr.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` wins over `default_filter` when set. Fails if a global
/// subscriber is already installed.
pub fn init_diagnostics(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
