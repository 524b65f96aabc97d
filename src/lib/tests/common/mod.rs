//! Shared fixtures for the integration tests

#![allow(dead_code)]

use certprov::manager::CertificateManager;
use certprov::storage::MemoryNamespace;
use certprov::time::ManualTimeSource;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SerialNumber};
use std::sync::Arc;
use time::OffsetDateTime;

/// Fixed wall clock for the tests (2033-05-18), well past the build timestamp.
pub const NOW: u64 = 2_000_000_000;

pub const DAY: u64 = 86_400;

pub struct Identity {
    pub cert: String,
    pub key: String,
}

pub fn certificate(key: &KeyPair, cn: &str, not_after_unix: u64, serial: &[u8]) -> String {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn.push(DnType::OrganizationName, "TaraMeteo");
    params.distinguished_name = dn;
    params.serial_number = Some(SerialNumber::from(serial.to_vec()));
    params.not_before = OffsetDateTime::from_unix_timestamp(not_after_unix as i64 - 365 * DAY as i64).unwrap();
    params.not_after = OffsetDateTime::from_unix_timestamp(not_after_unix as i64).unwrap();
    params.self_signed(key).unwrap().pem()
}

/// P-256 identity valid until `not_after_unix`.
pub fn identity(cn: &str, not_after_unix: u64) -> Identity {
    let key = KeyPair::generate().unwrap();
    Identity {
        cert: certificate(&key, cn, not_after_unix, &[0x01, 0x02, 0x03, 0x04]),
        key: key.serialize_pem(),
    }
}

/// RSA-2048 identity with a PKCS#1 (`RSA PRIVATE KEY`) encoded key.
pub fn rsa_identity(cn: &str, not_after_unix: u64) -> Identity {
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};

    let private = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let pkcs8 = private.to_pkcs8_pem(LineEnding::LF).unwrap();
    let signer = KeyPair::from_pem(&pkcs8).unwrap();
    Identity {
        cert: certificate(&signer, cn, not_after_unix, &[0x7F, 0x00, 0x01]),
        key: private.to_pkcs1_pem(LineEnding::LF).unwrap().to_string(),
    }
}

/// CA certificate text; its key is never needed.
pub fn ca_certificate() -> String {
    identity("TaraMeteo Test CA", NOW + 3650 * DAY).cert
}

pub fn clock() -> Arc<ManualTimeSource> {
    Arc::new(ManualTimeSource::from_unix_secs(NOW))
}

pub fn manager_over(namespace: &MemoryNamespace, clock: Arc<ManualTimeSource>) -> CertificateManager {
    let mut manager = CertificateManager::with_backend(Box::new(namespace.clone()), clock);
    manager.begin().unwrap();
    manager
}
