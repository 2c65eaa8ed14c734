//! Durable key/value storage and the checkout snapshot store.
//!
//! Storage outlives a single checkout page: what is written before the
//! redirect to the hosted payment page is what the next page reads back.
//! Values are JSON documents, one per key, overwritten wholesale.

use crate::types::CheckoutSnapshot;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Well-known key of the checkout snapshot
pub const SNAPSHOT_KEY: &str = "checkout_snapshot";

/// Errors from durable storage
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing store failed
    #[error("Storage I/O failed for '{key}': {source}")]
    Io {
        /// Key being accessed
        key: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A stored document could not be decoded
    #[error("Stored value for '{key}' is corrupt: {source}")]
    Corrupt {
        /// Key being read
        key: String,
        /// Decode error
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded
    #[error("Value for '{key}' could not be encoded: {source}")]
    Encode {
        /// Key being written
        key: String,
        /// Encode error
        #[source]
        source: serde_json::Error,
    },

    /// Keys are limited to ASCII letters, digits, `_` and `-`
    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),
}

/// Key/value persistence that survives the end of a checkout page
///
/// Implementations: [`FileStorage`] for real use, and
/// [`MemoryStorage`](crate::mocks::MemoryStorage) for tests.
pub trait KeyValueStorage: Send + Sync {
    /// Raw value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the value under `key`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`; removing a missing key is not an error
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Reads and decodes the JSON document under `key`.
///
/// # Errors
///
/// Returns [`StorageError::Corrupt`] when the document does not decode.
pub fn load_json<T: DeserializeOwned>(
    storage: &dyn KeyValueStorage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    storage
        .get(key)?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
}

/// Encodes `value` and stores it under `key`.
///
/// # Errors
///
/// Returns [`StorageError`] when encoding or writing fails.
pub fn save_json<T: Serialize>(
    storage: &dyn KeyValueStorage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    storage.set(key, &raw)
}

// ============================================================================
// File backend
// ============================================================================

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens (and creates if needed) a storage directory
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        tracing::debug!(dir = %dir.display(), "Opened file storage");
        Ok(Self { dir })
    }

    /// Directory holding the documents
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(self.dir.join(format!("{key}.json")))
        } else {
            Err(StorageError::InvalidKey(key.to_string()))
        }
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let staging = path.with_extension("json.tmp");
        let io_error = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        // Write then rename so a crash never leaves a half-written document
        fs::write(&staging, value).map_err(io_error)?;
        fs::rename(&staging, &path).map_err(io_error)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

// ============================================================================
// Snapshot store
// ============================================================================

/// Persists the in-progress checkout under [`SNAPSHOT_KEY`]
#[derive(Clone)]
pub struct SnapshotStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl SnapshotStore {
    /// Snapshot store over `storage`
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Overwrites the stored snapshot
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the snapshot cannot be written.
    pub fn save(&self, snapshot: &CheckoutSnapshot) -> Result<(), StorageError> {
        save_json(self.storage.as_ref(), SNAPSHOT_KEY, snapshot)?;
        tracing::info!(
            authorized_total = snapshot.authorized_total.minor(),
            "Checkout snapshot saved"
        );
        Ok(())
    }

    /// The stored snapshot, if any
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupt`] for an undecodable document; a
    /// corrupt snapshot is never treated as absent.
    pub fn load(&self) -> Result<Option<CheckoutSnapshot>, StorageError> {
        load_json(self.storage.as_ref(), SNAPSHOT_KEY)
    }

    /// Deletes the stored snapshot
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the snapshot cannot be removed.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(SNAPSHOT_KEY)?;
        tracing::info!("Checkout snapshot cleared");
        Ok(())
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").finish_non_exhaustive()
    }
}
