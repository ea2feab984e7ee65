//! File-backed key-value storage.
//!
//! The whole store is kept in memory and written back as a single JSON
//! document after every mutation.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{KeyValueStore, StoreError};

/// On-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileStoreData {
    /// Version of the store format (for future migrations).
    version: u32,

    /// All stored items.
    items: BTreeMap<String, String>,
}

impl Default for FileStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            items: BTreeMap::new(),
        }
    }
}

/// JSON-file key-value store.
///
/// # Thread Safety
///
/// Uses interior mutability via `RwLock`; share it across tasks via `Arc`.
pub struct FileStore {
    /// Path to the store JSON file.
    path: PathBuf,

    /// In-memory copy of the file contents.
    data: RwLock<FileStoreData>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// Creates parent directories if they don't exist. The file itself is
    /// only created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                FileStoreData::default()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            FileStoreData::default()
        };

        tracing::debug!(path = %path.display(), items = data.items.len(), "opened file store");

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `data` to disk through a temporary file so readers never see a
    /// half-written document.
    fn save(&self, data: &FileStoreData) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `mutate` to a copy of the items and keep it only once it is on
    /// disk. `mutate` returns whether anything changed.
    fn update(
        &self,
        mutate: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<(), StoreError> {
        let mut data = self.data.write();
        let mut next = data.clone();
        if !mutate(&mut next.items) {
            return Ok(());
        }
        self.save(&next)?;
        *data = next;
        Ok(())
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("keys_count", &self.data.read().items.len())
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.read().items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|items| {
            items.insert(key.to_string(), value.to_string());
            true
        })
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.update(|items| items.remove(key).is_some())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.update(|items| {
            items.clear();
            true
        })
    }
}
