//! Identity record persistence
//!
//! Maps an [`IdentityRecord`] onto the fixed key layout of the
//! `tarameteo_certs` namespace:
//!
//! | key            | value                          |
//! |----------------|--------------------------------|
//! | `cli_cert`     | client certificate PEM         |
//! | `cli_key`      | client private key PEM         |
//! | `ca_cert`      | CA chain PEM (optional)        |
//! | `cert_cn`      | Common Name, at most 63 bytes  |
//! | `cert_expires` | notAfter, Unix seconds, 0 = unknown |
//! | `cert_version` | provisioning counter           |

use super::{KeyValueStore, WriteBatch};
use crate::certificate::CommonName;
use crate::error::CPError;
use zeroize::Zeroizing;

pub const CERTS_NAMESPACE: &str = "tarameteo_certs";

pub const KEY_CLIENT_CERT: &str = "cli_cert";
pub const KEY_CLIENT_KEY: &str = "cli_key";
pub const KEY_CA_CERT: &str = "ca_cert";
pub const KEY_COMMON_NAME: &str = "cert_cn";
pub const KEY_EXPIRES: &str = "cert_expires";
pub const KEY_VERSION: &str = "cert_version";

/// A complete device identity.
///
/// The private key is wiped from memory when the record is dropped or
/// replaced.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub client_cert: String,
    pub client_key: Zeroizing<String>,
    pub ca_cert: Option<String>,
    pub common_name: CommonName,
    /// Uppercase hex; empty when it could not be extracted.
    pub serial_number: String,
    /// Unix seconds; 0 means unknown.
    pub expires_at: u64,
    pub version: u64,
}

impl std::fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("common_name", &self.common_name)
            .field("serial_number", &self.serial_number)
            .field("expires_at", &self.expires_at)
            .field("version", &self.version)
            .field("has_ca_cert", &self.ca_cert.is_some())
            .field("client_key", &"[REDACTED]")
            .finish()
    }
}

/// Passive persistence for the identity record.
pub struct IdentityStore {
    backend: Box<dyn KeyValueStore>,
}

impl IdentityStore {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn namespace(&self) -> &str {
        self.backend.namespace()
    }

    /// Load the stored record exactly as persisted.
    ///
    /// `Ok(None)` unless both certificate and key are present, whatever
    /// else the namespace holds. The serial number is not persisted, so it
    /// comes back empty; a missing CN also comes back empty. Deriving
    /// either from the certificate is up to the caller.
    pub fn load(&self) -> Result<Option<IdentityRecord>, CPError> {
        let client_cert = match self.backend.get_string(KEY_CLIENT_CERT)? {
            Some(cert) if !cert.is_empty() => cert,
            _ => return Ok(None),
        };
        let client_key = match self.backend.get_string(KEY_CLIENT_KEY)? {
            Some(key) if !key.is_empty() => Zeroizing::new(key),
            _ => return Ok(None),
        };
        let ca_cert = self
            .backend
            .get_string(KEY_CA_CERT)?
            .filter(|ca| !ca.is_empty());

        let mut common_name = CommonName::new();
        if let Some(cn) = self.backend.get_string(KEY_COMMON_NAME)? {
            for c in cn.chars() {
                if common_name.push(c).is_err() {
                    break;
                }
            }
        }

        Ok(Some(IdentityRecord {
            client_cert,
            client_key,
            ca_cert,
            common_name,
            serial_number: String::new(),
            expires_at: self.backend.get_u64(KEY_EXPIRES)?.unwrap_or(0),
            version: self.backend.get_u64(KEY_VERSION)?.unwrap_or(0),
        }))
    }

    /// Version counter as persisted, 0 when none.
    pub fn stored_version(&self) -> Result<u64, CPError> {
        Ok(self.backend.get_u64(KEY_VERSION)?.unwrap_or(0))
    }

    /// Persist every field of `record` in one commit.
    pub fn save(&self, record: &IdentityRecord) -> Result<(), CPError> {
        let mut batch = WriteBatch::new()
            .put_string(KEY_CLIENT_CERT, &record.client_cert)
            .put_string(KEY_CLIENT_KEY, &record.client_key);
        batch = match &record.ca_cert {
            Some(ca) => batch.put_string(KEY_CA_CERT, ca),
            None => batch.remove(KEY_CA_CERT),
        };
        let batch = batch
            .put_string(KEY_COMMON_NAME, &record.common_name)
            .put_u64(KEY_EXPIRES, record.expires_at)
            .put_u64(KEY_VERSION, record.version);

        self.backend.commit(batch).map_err(|e| match e {
            CPError::StorageError(_) => e,
            other => CPError::StorageError(other.to_string()),
        })
    }

    /// Erase the namespace.
    pub fn clear(&self) -> Result<(), CPError> {
        self.backend.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{self, test_support::self_signed};
    use crate::storage::MemoryNamespace;

    fn record(cert: &str, key: &str, version: u64) -> IdentityRecord {
        IdentityRecord {
            client_cert: cert.to_string(),
            client_key: Zeroizing::new(key.to_string()),
            ca_cert: None,
            common_name: certificate::extract_common_name(cert).unwrap(),
            serial_number: "1A2B3C".to_string(),
            expires_at: 1_900_000_000,
            version,
        }
    }

    #[test]
    fn test_save_and_load() {
        let ns = MemoryNamespace::new(CERTS_NAMESPACE);
        let store = IdentityStore::new(Box::new(ns.clone()));
        assert!(store.load().unwrap().is_none());

        let (cert, key) = self_signed("station-01", 1_900_000_000);
        let saved = record(&cert, &key, 1);
        store.save(&saved).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(
            loaded,
            IdentityRecord {
                serial_number: String::new(),
                ..saved
            }
        );
        assert_eq!(store.stored_version().unwrap(), 1);
        assert_eq!(
            ns.get_string(KEY_COMMON_NAME).unwrap().as_deref(),
            Some("station-01")
        );
        assert!(!ns.contains(KEY_CA_CERT).unwrap());
    }

    #[test]
    fn test_partial_record_reads_as_absent() {
        let ns = MemoryNamespace::new(CERTS_NAMESPACE);
        ns.commit(
            WriteBatch::new()
                .put_string(KEY_CLIENT_CERT, "cert")
                .put_string(KEY_COMMON_NAME, "station-01")
                .put_u64(KEY_VERSION, 4),
        )
        .unwrap();
        let store = IdentityStore::new(Box::new(ns));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_returns_only_persisted_fields() {
        let (cert, key) = self_signed("station-07", 1_900_000_000);
        let ns = MemoryNamespace::new(CERTS_NAMESPACE);
        ns.commit(
            WriteBatch::new()
                .put_string(KEY_CLIENT_CERT, &cert)
                .put_string(KEY_CLIENT_KEY, &key),
        )
        .unwrap();

        let loaded = IdentityStore::new(Box::new(ns)).load().unwrap().unwrap();
        assert!(loaded.common_name.is_empty());
        assert!(loaded.serial_number.is_empty());
        assert_eq!(loaded.expires_at, 0);
        assert_eq!(loaded.version, 0);
    }

    #[test]
    fn test_ca_removed_when_absent() {
        let (cert, key) = self_signed("station-01", 1_900_000_000);
        let ns = MemoryNamespace::new(CERTS_NAMESPACE);
        let store = IdentityStore::new(Box::new(ns.clone()));

        let mut with_ca = record(&cert, &key, 1);
        with_ca.ca_cert = Some(cert.clone());
        store.save(&with_ca).unwrap();
        assert!(ns.contains(KEY_CA_CERT).unwrap());

        store.save(&record(&cert, &key, 2)).unwrap();
        assert!(!ns.contains(KEY_CA_CERT).unwrap());
    }

    #[test]
    fn test_save_failure_is_storage_error() {
        let (cert, key) = self_signed("station-01", 1_900_000_000);
        let ns = MemoryNamespace::new(CERTS_NAMESPACE);
        ns.set_fail_writes(true);
        let store = IdentityStore::new(Box::new(ns));
        let err = store.save(&record(&cert, &key, 1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Storage);
    }

    #[test]
    fn test_debug_redacts_key() {
        let (cert, key) = self_signed("station-01", 1_900_000_000);
        let debug = format!("{:?}", record(&cert, &key, 1));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
