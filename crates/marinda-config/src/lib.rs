//! Configuration and shared utilities for the Marinda client core.
//!
//! This crate provides:
//! - Build-time and file-based configuration (`Config`)
//! - File system paths for client data (`Paths`)
//! - Logging initialization on top of `tracing-subscriber`
//! - The core error type shared by the utility layer

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_LOG_LEVEL, DEFAULT_SUPABASE_PUBLISHABLE_KEY, DEFAULT_SUPABASE_URL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
