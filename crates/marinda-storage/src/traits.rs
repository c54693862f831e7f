//! Storage trait definitions.

use crate::StorageResult;

/// Trait for persisted key-value storage backends
pub trait KeyValueStore: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Remove a value, returning whether it existed
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

// Allows one backing store to be shared by several owners
// (e.g. the session manager and the active-family selector).
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        (**self).remove(key)
    }
}
