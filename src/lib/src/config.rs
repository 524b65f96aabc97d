//! Configuration for the lifecycle manager and the provisioning session
//!
//! Every struct has working defaults matching the shipped firmware, so a
//! device config file only needs the fields it changes:
//!
//! ```json
//! {
//!   "storage_dir": "/var/lib/certprov",
//!   "manager": { "expiry_warning_days": 14 },
//!   "provisioning": { "http_port": 8080 }
//! }
//! ```

use crate::error::CPError;
use crate::storage::identity::CERTS_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What to record when a certificate's notAfter cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryFallback {
    /// Record expiry as unknown (0) and report it as such.
    Unknown,
    /// Pretend the certificate is valid for this many days from now.
    AssumeValidFor(u64),
}

/// Lifecycle manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Storage namespace holding the identity record
    pub namespace: String,

    /// Warn when the certificate expires within this many days
    pub expiry_warning_days: u64,

    /// Common Name capacity in bytes (at most 63)
    pub cn_capacity: usize,

    /// Behaviour when expiration cannot be extracted at store time
    pub expiry_fallback: ExpiryFallback,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            namespace: CERTS_NAMESPACE.to_string(),
            expiry_warning_days: 30,
            cn_capacity: crate::certificate::MAX_CN_LENGTH,
            expiry_fallback: ExpiryFallback::Unknown,
        }
    }
}

impl ManagerConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_expiry_warning_days(mut self, days: u64) -> Self {
        self.expiry_warning_days = days;
        self
    }

    /// Clamped to the maximum CN length.
    pub fn with_cn_capacity(mut self, capacity: usize) -> Self {
        self.cn_capacity = capacity.min(crate::certificate::MAX_CN_LENGTH);
        self
    }

    pub fn with_expiry_fallback(mut self, fallback: ExpiryFallback) -> Self {
        self.expiry_fallback = fallback;
        self
    }
}

/// Provisioning access point and HTTP settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// SSID prefix; the advertised name is `<prefix>-XXXX`
    pub ssid_prefix: String,

    pub ap_address: Ipv4Addr,
    pub ap_gateway: Ipv4Addr,
    pub ap_netmask: Ipv4Addr,

    pub http_port: u16,

    /// Interval between session heartbeat diagnostics
    pub heartbeat_interval_secs: u64,

    /// Delay between a successful submission and the restart request
    pub restart_delay_secs: u64,

    /// How long the embedding application should keep the session open.
    /// The session itself never times out on its own.
    pub session_timeout_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            ssid_prefix: "TaraMeteoProv".to_string(),
            ap_address: Ipv4Addr::new(192, 168, 4, 1),
            ap_gateway: Ipv4Addr::new(192, 168, 4, 1),
            ap_netmask: Ipv4Addr::new(255, 255, 255, 0),
            http_port: 80,
            heartbeat_interval_secs: 30,
            restart_delay_secs: 3,
            session_timeout_secs: 300,
        }
    }
}

impl ProvisioningConfig {
    pub fn with_ssid_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ssid_prefix = prefix.into();
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_secs = interval.as_secs();
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay_secs = delay.as_secs();
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout_secs = timeout.as_secs();
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

/// Whole-device configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Directory holding the file-backed namespaces
    pub storage_dir: PathBuf,

    pub manager: ManagerConfig,
    pub provisioning: ProvisioningConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("."),
            manager: ManagerConfig::default(),
            provisioning: ProvisioningConfig::default(),
        }
    }
}

impl DeviceConfig {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<Vec<u8>, CPError> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CPError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Deserialize from JSON
    pub fn from_json(data: &[u8]) -> Result<Self, CPError> {
        let config: Self = serde_json::from_slice(data)
            .map_err(|e| CPError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CPError> {
        let data = std::fs::read(path).map_err(|e| {
            CPError::ConfigError(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&data)
    }

    fn validate(&self) -> Result<(), CPError> {
        if self.manager.namespace.is_empty() {
            return Err(CPError::ConfigError("Empty storage namespace".to_string()));
        }
        if self.manager.cn_capacity == 0
            || self.manager.cn_capacity > crate::certificate::MAX_CN_LENGTH
        {
            return Err(CPError::ConfigError(format!(
                "cn_capacity must be between 1 and {}",
                crate::certificate::MAX_CN_LENGTH
            )));
        }
        if self.provisioning.heartbeat_interval_secs == 0 {
            return Err(CPError::ConfigError(
                "heartbeat_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
