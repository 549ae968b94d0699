//! Device-local key-value storage
//!
//! History, favorites and the dark-mode preference are stored as text under
//! distinct keys. [`FileStore`] keeps one file per key in the user's data
//! directory; [`MemoryStore`] backs tests and sessions without a data
//! directory.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A text key-value store with read-after-write consistency
pub(crate) trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, `None` if absent
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Default storage directory (`<data_dir>/Shortgen/storage`)
pub(crate) fn default_storage_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("Shortgen").join("storage"))
}

/// Open the store used by a session
///
/// Falls back to an in-memory store when no directory can be resolved, so
/// the session still works without persistence.
pub(crate) fn open_store(dir: Option<PathBuf>) -> Arc<dyn KeyValueStore> {
    match dir.or_else(default_storage_dir) {
        Some(dir) => {
            info!("Using device storage at {:?}", dir);
            Arc::new(FileStore::new(dir))
        }
        None => {
            warn!("No data directory available, history and favorites will not persist");
            Arc::new(MemoryStore::default())
        }
    }
}

/// File-backed store, one file per key
pub(crate) struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| StorageError::CreateDirectory {
                path: self.dir.clone(),
                source: e,
            })?;
            info!("Created storage directory: {:?}", self.dir);
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| StorageError::Read { path, source: e })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        self.ensure_dir()?;

        // Write to a sibling temp file, then rename over the target
        let tmp_path = path.with_extension("json.tmp");
        write_synced(&tmp_path, value)?;
        fs::rename(&tmp_path, &path).map_err(|e| StorageError::Write {
            path: path.clone(),
            source: e,
        })?;

        debug!(key, bytes = value.len(), "Stored value");
        Ok(())
    }
}

fn write_synced(path: &Path, value: &str) -> Result<(), StorageError> {
    let write_err = |e| StorageError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = File::create(path).map_err(write_err)?;
    file.write_all(value.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    Ok(())
}

/// In-memory store
#[derive(Default)]
pub(crate) struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.values.lock() {
            Ok(values) => values,
            Err(poisoned) => {
                warn!("Memory store mutex was poisoned, recovering data");
                poisoned.into_inner()
            }
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Storage errors with contextual information
#[derive(Debug, thiserror::Error)]
pub(crate) enum StorageError {
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
