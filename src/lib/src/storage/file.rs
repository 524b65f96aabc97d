//! File-backed namespace
//!
//! One JSON object per namespace at `<dir>/<namespace>.json`, replaced
//! atomically with owner-only permissions on every commit.

use super::{KeyValueStore, StorageMetadata, Value, WriteBatch};
use crate::error::CPError;
use crate::secure_file;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Namespace persisted as a JSON document on the host filesystem.
#[derive(Debug)]
pub struct FileNamespace {
    name: String,
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileNamespace {
    /// Bind to `<dir>/<name>.json`. The directory must exist; the file is
    /// created on first commit.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self, CPError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(CPError::ConfigError(format!(
                "Invalid namespace name '{}'",
                name
            )));
        }
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(CPError::StorageError(format!(
                "Storage directory '{}' does not exist",
                dir.display()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            path: dir.join(format!("{}.json", name)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, Value>, CPError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = secure_file::read_secure_string(&self.path)?;
        serde_json::from_str(&text).map_err(|e| {
            CPError::StorageError(format!(
                "Corrupt namespace file '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, Value>) -> Result<(), CPError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| CPError::StorageError(format!("Failed to serialize namespace: {}", e)))?;
        secure_file::write_atomic(&self.path, &json).map_err(|e| {
            CPError::StorageError(format!("Failed to write '{}': {}", self.path.display(), e))
        })
    }
}

impl KeyValueStore for FileNamespace {
    fn namespace(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<Value>, CPError> {
        Ok(self.read_all()?.remove(key))
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), CPError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| CPError::StorageError("Lock poisoned".to_string()))?;
        let mut entries = self.read_all()?;
        batch.apply_to(&mut entries);
        self.write_all(&entries)
    }

    fn clear(&self) -> Result<(), CPError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| CPError::StorageError("Lock poisoned".to_string()))?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CPError::StorageError(format!(
                "Failed to erase '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn metadata(&self) -> StorageMetadata {
        StorageMetadata {
            storage_type: "file",
            persistent: true,
        }
    }
}
