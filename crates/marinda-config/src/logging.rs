//! Logging initialization for the client core.
//!
//! All components use standard `tracing` macros; this module wires up a
//! `tracing-subscriber` registry with an env-filter so `RUST_LOG` can
//! override the configured default level at runtime.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging system for the client core.
///
/// Sets up tracing with:
/// - Compact formatted output to stderr
/// - Log level from RUST_LOG env var or the provided default
///
/// Safe to call once per process; subsequent calls are ignored.
///
/// # Arguments
///
/// * `level` - Default log level (trace, debug, info, warn, error)
///
/// # Example
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("client core started");
/// ```
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
