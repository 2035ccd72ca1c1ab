//! Device-local key-value storage for the ephemeral secret.
//!
//! Mirrors browser local storage: one string value per key, persisted across
//! sessions on this device, never synchronised elsewhere.

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use thiserror::Error;
use tracing::debug;

/// Errors from a [`SecretStore`] backend.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// The backing file could not be read or written.
    #[error("secret store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file exists but is not a JSON string map.
    #[error("secret store is corrupt: {0}")]
    Corrupt(String),
}

/// Synchronous single-value storage keyed by string.
#[cfg_attr(test, mockall::automock)]
pub trait SecretStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, SecretStoreError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), SecretStoreError>;
}

/// In-process store. Each instance behaves like a separate device.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Store backed by a JSON object file on local disk.
///
/// The whole map is rewritten on every `set` through a temporary file and an
/// atomic rename. On Unix the file is created with mode `0600`.
#[derive(Debug)]
pub struct FileSecretStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSecretStore {
    /// Create a store persisted at `path`. The file is created lazily.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, SecretStoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&text).map_err(|e| SecretStoreError::Corrupt(e.to_string()))
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), SecretStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(values)
            .map_err(|e| SecretStoreError::Corrupt(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = open_private(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "secret store persisted");
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut values = self.load()?;
        values.insert(key.to_owned(), value.to_owned());
        self.persist(&values)
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
