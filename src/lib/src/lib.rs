//! Device mTLS identity lifecycle and field provisioning.

// `CertificateManager` is what most firmware needs: begin(), then load_certificates_into() for the broker connection.
// `ProvisioningSession` is only brought up when the manager reports that provisioning is needed.

#![forbid(unsafe_code)]

mod error;

/// Certificate codec: Common Name, serial, expiry and key-pair matching
pub mod certificate;

/// Configuration structs with firmware defaults
pub mod config;

/// Lifecycle manager owning the device identity
pub mod manager;

/// Access point, HTTP surface and the provisioning session state machine
pub mod provisioning;

/// Owner-only atomic file writes for identity material
pub mod secure_file;

/// Key/value namespaces and the identity record layout
pub mod storage;

/// Clock abstraction for devices without a trustworthy wall clock
///
/// Supports a build-time lower bound so an unsynchronised clock is detected
/// instead of trusted.
pub mod time;

/// Hand-off of validated material to a TLS transport
pub mod transport;

/// WiFi credentials captured during provisioning
pub mod wifi;

#[allow(unused_imports)]
pub use error::*;

pub use manager::{CertificateManager, ExpiryStatus, LifecycleState};
pub use transport::{ServerVerification, TransportSink};

pub mod reexports {
    pub use {heapless, log, thiserror, zeroize};
}
