//! Hand-off of validated key material to a TLS transport
//!
//! The manager never opens connections itself. An MQTT or HTTPS client
//! implements [`TransportSink`] and receives PEM text that has already
//! passed the format and key-pair checks.

use zeroize::Zeroizing;

/// Receiver of mTLS material.
pub trait TransportSink {
    fn set_ca_cert(&mut self, pem: &str);
    fn set_certificate(&mut self, pem: &str);
    fn set_private_key(&mut self, pem: &str);
}

/// Whether the transport can authenticate the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerVerification {
    /// A CA chain was supplied
    Enabled,
    /// Client material only; the server certificate will not be checked
    Disabled,
}

/// Sink that simply keeps what it was given.
///
/// Useful for exporting the identity (the CLI writes it out as files) and
/// for tests.
#[derive(Default)]
pub struct PemBundle {
    pub ca_cert: Option<String>,
    pub certificate: Option<String>,
    pub private_key: Option<Zeroizing<String>>,
}

impl PemBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.certificate.is_some() && self.private_key.is_some()
    }
}

impl std::fmt::Debug for PemBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PemBundle")
            .field("ca_cert", &self.ca_cert.is_some())
            .field("certificate", &self.certificate.is_some())
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl TransportSink for PemBundle {
    fn set_ca_cert(&mut self, pem: &str) {
        self.ca_cert = Some(pem.to_string());
    }

    fn set_certificate(&mut self, pem: &str) {
        self.certificate = Some(pem.to_string());
    }

    fn set_private_key(&mut self, pem: &str) {
        self.private_key = Some(Zeroizing::new(pem.to_string()));
    }
}
