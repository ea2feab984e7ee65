//! Persisted key-value storage.
//!
//! This module provides:
//! - [`KeyValueStore`] - Trait for string key-value backends
//! - [`MemoryStore`] - In-memory implementation for tests and ephemeral clients
//! - [`FileStore`] - JSON file in the platform data directory
//!
//! The store is shared with unrelated application state (theme, language,
//! per-screen caches). Session tokens live under the `auth.` prefix, but
//! [`KeyValueStore::clear`] wipes every key regardless of prefix.
//!
//! # Example
//!
//! ```rust,ignore
//! use fitcoach_session::store::{KeyValueStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! store.set_item("app.theme", "dark").await?;
//! assert_eq!(store.get_item("app.theme").await?.as_deref(), Some("dark"));
//! store.clear().await?;
//! ```

use async_trait::async_trait;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Error type for key-value store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// I/O error reading or writing the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Abstraction over persisted key-value backends.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value at the given key, overwriting any existing value.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value by key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every key in the store, not just session keys.
    async fn clear(&self) -> Result<(), StoreError>;
}
