//! Logging and tracing initialization.
//!
//! The library logs through [`tracing`]: token failures at `warn` with the
//! opaque handle and decoded payload, infrastructure failures at `error`,
//! issuance and consumption at `debug`. Hosts that already install their
//! own subscriber can ignore this module; the functions here are for hosts
//! that want a working default.
//!
//! The level is controlled via the `RUST_LOG` environment variable:
//!
//! ```bash
//! RUST_LOG=account_core=debug cargo run
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with sensible defaults.
///
/// Call once at application startup, before constructing the flow. The
/// level comes from `RUST_LOG` and defaults to `info`.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize logging with a specific level instead of `RUST_LOG`.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize JSON-formatted logging (recommended for production log
/// aggregation).
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
