//! File system paths for client data.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Store filename under the base directory.
const STORE_FILE_NAME: &str = "store.json";

/// Manages file system paths for the client core.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for client data (~/.marinda)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.marinda`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".marinda"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.marinda).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.marinda/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the persisted key-value store path (~/.marinda/store.json).
    pub fn store_file(&self) -> PathBuf {
        self.base_dir.join(STORE_FILE_NAME)
    }

    /// Get the logs directory (~/.marinda/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the client log file path (~/.marinda/logs/client.log).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("client.log")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new().expect("Failed to determine home directory")
    }
}
