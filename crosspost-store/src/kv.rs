//! Key-value blob collaborator, the stand-in for browser local storage.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};
use thiserror::Error;
use tracing::trace;

pub type Result<T, E = KvError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Key {0:?} is not a valid storage key")]
    InvalidKey(String),
    #[error("Reading key {key:?} failed: {source}")]
    Read { key: String, source: io::Error },
    #[error("Writing key {key:?} failed: {source}")]
    Write { key: String, source: io::Error },
}

/// Blob storage addressed by fixed string keys.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores every key as one file inside a directory.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(KvError::InvalidKey(key.to_owned()));
        }

        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(KvError::Read {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let write_err = |source| KvError::Write {
            key: key.to_owned(),
            source,
        };

        // Write next to the target and rename, so readers never see half a blob.
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, value).map_err(write_err)?;
        std::fs::rename(&staging, &path).map_err(write_err)?;

        trace!(key, path = %path.display(), bytes = value.len(), "Wrote key");
        Ok(())
    }
}

/// Volatile store, used by tests and when no storage directory is configured.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        store
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
