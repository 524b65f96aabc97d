//! Durable key/value namespaces
//!
//! Identity material and WiFi credentials each live in one named namespace
//! of a small key/value store, the way a device keeps them in NVS
//! partitions. [`KeyValueStore`] abstracts the backend so the same lifecycle
//! code runs against:
//! - [`MemoryNamespace`]: tests and ephemeral runs
//! - [`FileNamespace`]: a JSON document on the host filesystem
//!
//! Writes are grouped in a [`WriteBatch`] and committed all-or-nothing, so a
//! reader never observes half of a record.

use crate::error::CPError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

mod file;
pub mod identity;

pub use file::FileNamespace;
pub use identity::{IdentityRecord, IdentityStore};

/// A stored value. Untagged so the file backend stays human-readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Unsigned(u64),
    Text(String),
}

/// Ordered set of puts and removes applied as one unit.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<(String, Option<Value>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_string(mut self, key: &str, value: &str) -> Self {
        self.ops.push((key.to_string(), Some(Value::Text(value.to_string()))));
        self
    }

    pub fn put_u64(mut self, key: &str, value: u64) -> Self {
        self.ops.push((key.to_string(), Some(Value::Unsigned(value))));
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.ops.push((key.to_string(), None));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply to an in-memory map. Later operations on a key win.
    pub(crate) fn apply_to(self, map: &mut BTreeMap<String, Value>) {
        for (key, value) in self.ops {
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
    }
}

/// Metadata about a storage backend, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct StorageMetadata {
    /// Human-readable storage type
    pub storage_type: &'static str,

    /// Whether values survive a restart
    pub persistent: bool,
}

/// One named namespace of a key/value store.
///
/// Implement this for the device's storage (NVS, EEPROM emulation, a
/// secure element) to plug it into [`IdentityStore`] or the WiFi
/// credential store.
pub trait KeyValueStore: Send + Sync {
    /// Namespace this handle is bound to.
    fn namespace(&self) -> &str;

    /// Read one value. `Ok(None)` when the key is not present.
    fn get(&self, key: &str) -> Result<Option<Value>, CPError>;

    /// Commit every operation in `batch`, or none of them.
    fn commit(&self, batch: WriteBatch) -> Result<(), CPError>;

    /// Erase the whole namespace.
    fn clear(&self) -> Result<(), CPError>;

    /// Read a text value; a value of another type reads as absent.
    fn get_string(&self, key: &str) -> Result<Option<String>, CPError> {
        Ok(match self.get(key)? {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        })
    }

    /// Read an unsigned value; a value of another type reads as absent.
    fn get_u64(&self, key: &str) -> Result<Option<u64>, CPError> {
        Ok(match self.get(key)? {
            Some(Value::Unsigned(n)) => Some(n),
            _ => None,
        })
    }

    fn contains(&self, key: &str) -> Result<bool, CPError> {
        Ok(self.get(key)?.is_some())
    }

    fn metadata(&self) -> StorageMetadata {
        StorageMetadata::default()
    }
}

/// In-memory namespace.
///
/// Clones share the same map, so a test can hand one handle to a manager
/// and inspect (or reopen) the data through another. Write failures can be
/// injected to exercise storage error paths.
#[derive(Debug, Clone)]
pub struct MemoryNamespace {
    name: String,
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryNamespace {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent `commit`/`clear` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), CPError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CPError::StorageError(format!(
                "Namespace '{}' is not writable",
                self.name
            )));
        }
        Ok(())
    }
}

fn poisoned() -> CPError {
    CPError::StorageError("Lock poisoned".to_string())
}

impl KeyValueStore for MemoryNamespace {
    fn namespace(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<Value>, CPError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), CPError> {
        self.check_writable()?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        batch.apply_to(&mut entries);
        Ok(())
    }

    fn clear(&self) -> Result<(), CPError> {
        self.check_writable()?;
        self.entries.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }

    fn metadata(&self) -> StorageMetadata {
        StorageMetadata {
            storage_type: "memory",
            persistent: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_namespace_roundtrip() {
        let ns = MemoryNamespace::new("test");
        assert_eq!(ns.namespace(), "test");
        assert!(ns.is_empty());

        ns.commit(WriteBatch::new().put_string("name", "station-01").put_u64("count", 3))
            .unwrap();

        assert_eq!(ns.get_string("name").unwrap().as_deref(), Some("station-01"));
        assert_eq!(ns.get_u64("count").unwrap(), Some(3));
        assert!(ns.contains("name").unwrap());
        assert!(!ns.contains("missing").unwrap());
    }

    #[test]
    fn test_type_mismatch_reads_as_absent() {
        let ns = MemoryNamespace::new("test");
        ns.commit(WriteBatch::new().put_u64("n", 1)).unwrap();
        assert_eq!(ns.get_string("n").unwrap(), None);
    }

    #[test]
    fn test_clones_share_entries() {
        let ns = MemoryNamespace::new("test");
        let other = ns.clone();
        ns.commit(WriteBatch::new().put_string("k", "v")).unwrap();
        assert_eq!(other.get_string("k").unwrap().as_deref(), Some("v"));

        other.clear().unwrap();
        assert!(ns.is_empty());
    }

    #[test]
    fn test_failed_commit_leaves_entries_untouched() {
        let ns = MemoryNamespace::new("test");
        ns.commit(WriteBatch::new().put_string("k", "old")).unwrap();

        ns.set_fail_writes(true);
        let err = ns
            .commit(WriteBatch::new().put_string("k", "new").put_string("j", "x"))
            .unwrap_err();
        assert!(matches!(err, CPError::StorageError(_)));
        assert!(ns.clear().is_err());

        assert_eq!(ns.get_string("k").unwrap().as_deref(), Some("old"));
        assert!(!ns.contains("j").unwrap());
    }

    #[test]
    fn test_batch_remove_and_ordering() {
        let ns = MemoryNamespace::new("test");
        ns.commit(WriteBatch::new().put_string("a", "1").put_string("b", "2"))
            .unwrap();
        ns.commit(WriteBatch::new().remove("a").put_string("b", "3").put_string("b", "4"))
            .unwrap();
        assert!(!ns.contains("a").unwrap());
        assert_eq!(ns.get_string("b").unwrap().as_deref(), Some("4"));
    }

    #[test]
    fn test_value_json_is_untagged() {
        let mut map = BTreeMap::new();
        map.insert("n".to_string(), Value::Unsigned(7));
        map.insert("s".to_string(), Value::Text("x".to_string()));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"n":7,"s":"x"}"#);
    }
}
