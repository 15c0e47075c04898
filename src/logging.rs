//! Logging setup for the provider binary.
//!
//! Logs go to **stderr**: stdout carries the handshake line the host reads.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `azureml_provider=debug`)
//!
//! ```bash
//! # Trace every workspace API call
//! RUST_LOG=azureml_provider::workspace=debug ./terraform-provider-azureml
//! ```

use tracing_subscriber::{fmt, prelude::*, registry::Registry, EnvFilter, Layer};

fn stderr_layer(default_level: &str) -> impl Layer<Registry> + Send + Sync {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(filter)
}

/// Install the global subscriber, filtering at `default_level` unless
/// `RUST_LOG` is set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(stderr_layer(default_level))
        .init();
}

/// Like [`init_logging`] at `info`, but returns `false` instead of panicking
/// when a subscriber is already installed.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(stderr_layer("info"))
        .try_init()
        .is_ok()
}
