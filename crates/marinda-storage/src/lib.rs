//! Device-local persisted storage for the Marinda client core.
//!
//! This crate provides:
//! - A `KeyValueStore` trait over single-key string storage
//! - A JSON-file backend that survives process restarts (`FileStore`)
//! - Typed key constants (`StorageKeys`)
//! - A high-level `PrefsManager` for session tokens, session metadata, and
//!   the per-identity active-family selection

mod file;
mod keys;
mod prefs;
mod traits;

pub use file::FileStore;
pub use keys::StorageKeys;
pub use prefs::{PrefsManager, SessionMeta};
pub use traits::KeyValueStore;

use marinda_config::Paths;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backing store could not be read or written
    #[error("Store error: {0}")]
    Store(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default file-backed storage implementation.
pub fn create_store(paths: &Paths) -> StorageResult<Box<dyn KeyValueStore>> {
    let store = FileStore::open(paths.store_file())?;
    Ok(Box::new(store))
}

/// Create a PrefsManager backed by the default file store.
pub fn create_prefs_manager(paths: &Paths) -> StorageResult<PrefsManager> {
    let store = create_store(paths)?;
    Ok(PrefsManager::new(store))
}
