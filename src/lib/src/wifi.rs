//! WiFi station credentials captured during provisioning
//!
//! The provisioning form can carry an SSID and passphrase next to the
//! certificate. They are committed before the certificate, through the
//! [`CredentialStore`] collaborator; the station/reconnect logic that
//! consumes them lives outside this crate.

use crate::error::CPError;
use crate::storage::{KeyValueStore, WriteBatch};
use zeroize::Zeroizing;

pub const WIFI_NAMESPACE: &str = "tarameteo_wifi";

const KEY_SSID: &str = "ssid";
const KEY_PASSWORD: &str = "password";

/// 802.11 SSIDs are at most 32 bytes.
pub const MAX_SSID_LENGTH: usize = 32;

/// WPA2 passphrases are at most 63 characters; keep room for a 64-byte hex PSK.
pub const MAX_PASSWORD_LENGTH: usize = 64;

/// Station credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Collaborator that persists WiFi credentials.
pub trait CredentialStore {
    fn store_credentials(&mut self, ssid: &str, password: &str) -> Result<(), CPError>;
}

/// Credential store over a key/value namespace (`tarameteo_wifi`).
pub struct NamespaceCredentialStore {
    backend: Box<dyn KeyValueStore>,
}

impl NamespaceCredentialStore {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Stored credentials, if both fields are present.
    pub fn load_credentials(&self) -> Result<Option<WifiCredentials>, CPError> {
        let ssid = self.backend.get_string(KEY_SSID)?;
        let password = self.backend.get_string(KEY_PASSWORD)?;
        Ok(match (ssid, password) {
            (Some(ssid), Some(password)) if !ssid.is_empty() => Some(WifiCredentials {
                ssid,
                password: Zeroizing::new(password),
            }),
            _ => None,
        })
    }

    pub fn has_credentials(&self) -> bool {
        matches!(self.load_credentials(), Ok(Some(_)))
    }

    pub fn clear(&self) -> Result<(), CPError> {
        self.backend.clear()
    }
}

impl CredentialStore for NamespaceCredentialStore {
    fn store_credentials(&mut self, ssid: &str, password: &str) -> Result<(), CPError> {
        if ssid.is_empty() || password.is_empty() {
            return Err(CPError::InvalidCredentials);
        }
        if ssid.len() > MAX_SSID_LENGTH || password.len() > MAX_PASSWORD_LENGTH {
            log::warn!(
                "WiFi credentials rejected: ssid {} bytes (max {}), password {} bytes (max {})",
                ssid.len(),
                MAX_SSID_LENGTH,
                password.len(),
                MAX_PASSWORD_LENGTH
            );
            return Err(CPError::InvalidCredentials);
        }
        self.backend.commit(
            WriteBatch::new()
                .put_string(KEY_SSID, ssid)
                .put_string(KEY_PASSWORD, password),
        )?;
        log::info!("WiFi credentials stored for SSID '{}'", ssid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryNamespace;

    #[test]
    fn test_store_and_load() {
        let ns = MemoryNamespace::new(WIFI_NAMESPACE);
        let mut store = NamespaceCredentialStore::new(Box::new(ns));
        assert!(!store.has_credentials());

        store.store_credentials("weather-net", "hunter22").unwrap();
        let creds = store.load_credentials().unwrap().unwrap();
        assert_eq!(creds.ssid, "weather-net");
        assert_eq!(creds.password.as_str(), "hunter22");
        assert!(!format!("{:?}", creds).contains("hunter22"));

        store.clear().unwrap();
        assert!(!store.has_credentials());
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        let mut store = NamespaceCredentialStore::new(Box::new(MemoryNamespace::new(WIFI_NAMESPACE)));
        assert!(matches!(
            store.store_credentials("", "pw"),
            Err(CPError::InvalidCredentials)
        ));
        assert!(store.store_credentials("net", "").is_err());
        assert!(store.store_credentials(&"s".repeat(33), "pw").is_err());
        assert!(store.store_credentials("net", &"p".repeat(65)).is_err());
        assert!(store.store_credentials(&"s".repeat(32), &"p".repeat(64)).is_ok());
    }

    #[test]
    fn test_storage_failure_propagates() {
        let ns = MemoryNamespace::new(WIFI_NAMESPACE);
        ns.set_fail_writes(true);
        let mut store = NamespaceCredentialStore::new(Box::new(ns));
        assert!(matches!(
            store.store_credentials("net", "pw"),
            Err(CPError::StorageError(_))
        ));
    }
}
