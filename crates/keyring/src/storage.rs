use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{KeyringError, KeyringResult};

/// Opaque blob storage addressed by `/`-separated keys.
#[async_trait]
pub trait KeyringStore: Send + Sync {
    /// `Ok(None)` when nothing was ever saved under `key`.
    async fn load(&self, key: &str) -> KeyringResult<Option<Vec<u8>>>;
    async fn save(&self, key: &str, bytes: &[u8]) -> KeyringResult<()>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> KeyringResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyringStore for MemoryStore {
    async fn load(&self, key: &str) -> KeyringResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> KeyringResult<()> {
        self.blobs.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> KeyringResult<()> {
        self.blobs.write().remove(key);
        Ok(())
    }
}

/// One JSON file per key under `root`, e.g. `keyring/index` is stored at
/// `<root>/keyring/index.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> KeyringResult<PathBuf> {
        let valid_segment = |segment: &str| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
        };
        if !key.split('/').all(valid_segment) {
            return Err(KeyringError::InvalidStorageKey(key.to_string()));
        }
        let mut path = self.root.join(key);
        path.set_extension("json");
        Ok(path)
    }

    fn atomic_write(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl KeyringStore for FileStore {
    async fn load(&self, key: &str) -> KeyringResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(KeyringError::Io(err)),
        }
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> KeyringResult<()> {
        let path = self.path_for(key)?;
        Self::atomic_write(&path, bytes)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> KeyringResult<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(KeyringError::Io(err)),
        }
    }
}
