/// Broad classes of failure, used by callers that only care about the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// PEM structurally malformed or missing required markers
    Format,
    /// Certificate and private key do not form a pair
    CryptoMismatch,
    /// A certificate field could not be extracted
    Extraction,
    /// Durable storage read or write failure
    Storage,
    /// Access point or HTTP listener could not be brought up
    NetworkSetup,
    /// Operation attempted in the wrong lifecycle state
    State,
    /// Anything else (I/O, clock, bad arguments)
    Internal,
}

/// The certprov error type.
#[derive(Debug, thiserror::Error)]
pub enum CPError {
    #[error("Internal error: [{0}]")]
    InternalError(String),

    #[error("I/O error")]
    IOError(#[from] std::io::Error),

    #[error("Invalid argument")]
    InvalidArgument,

    #[error("Usage error: {0}")]
    UsageError(&'static str),

    #[error("Invalid certificate format")]
    InvalidCertificateFormat,

    #[error("Invalid private key format")]
    InvalidPrivateKeyFormat,

    #[error("PEM error: {0}")]
    PemError(String),

    #[error("X509 error: {0}")]
    X509Error(String),

    #[error("Unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Certificate and key do not match")]
    KeyMismatch,

    #[error("Failed to extract CN from certificate")]
    CommonNameNotFound,

    #[error("Serial number needs {needed} bytes, buffer holds {capacity}")]
    SerialTooLong { needed: usize, capacity: usize },

    #[error("Failed to extract {0} from certificate")]
    ExtractionFailed(&'static str),

    #[error("Certificate has expired")]
    CertificateExpired,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Failed to configure AP")]
    AccessPointConfig,

    #[error("Failed to start AP")]
    AccessPointStart,

    #[error("HTTP listener error: {0}")]
    ListenerError(String),

    #[error("Certificates not provisioned")]
    NotProvisioned,

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Invalid WiFi credentials")]
    InvalidCredentials,

    #[error("Time error: {0}")]
    TimeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CPError {
    /// Map this error onto the coarse error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CPError::InvalidCertificateFormat
            | CPError::InvalidPrivateKeyFormat
            | CPError::PemError(_)
            | CPError::UnsupportedAlgorithm(_) => ErrorKind::Format,
            CPError::KeyMismatch => ErrorKind::CryptoMismatch,
            CPError::X509Error(_)
            | CPError::CommonNameNotFound
            | CPError::SerialTooLong { .. }
            | CPError::ExtractionFailed(_)
            | CPError::CertificateExpired => ErrorKind::Extraction,
            CPError::StorageError(_) | CPError::InvalidCredentials => ErrorKind::Storage,
            CPError::AccessPointConfig | CPError::AccessPointStart | CPError::ListenerError(_) => {
                ErrorKind::NetworkSetup
            }
            CPError::NotProvisioned | CPError::InvalidState(_) => ErrorKind::State,
            CPError::InternalError(_)
            | CPError::IOError(_)
            | CPError::InvalidArgument
            | CPError::UsageError(_)
            | CPError::TimeError(_)
            | CPError::ConfigError(_) => ErrorKind::Internal,
        }
    }
}

impl From<x509_parser::error::X509Error> for CPError {
    fn from(err: x509_parser::error::X509Error) -> Self {
        CPError::X509Error(format!("{:?}", err))
    }
}

impl From<pem::PemError> for CPError {
    fn from(err: pem::PemError) -> Self {
        CPError::PemError(err.to_string())
    }
}
