//! Field provisioning over a local access point
//!
//! A sensor that has no identity (or an expired one) opens an isolated
//! WiFi network and serves a small form. An installer pastes the client
//! certificate, its private key, an optional CA chain and optionally WiFi
//! credentials; the session commits them through the
//! [`CertificateManager`](crate::manager::CertificateManager) and asks the
//! application to restart.
//!
//! # Example
//!
//! ```ignore
//! use certprov::provisioning::{HostAccessPoint, ProvisioningSession, TcpHttpListener};
//!
//! let mut session = ProvisioningSession::new(
//!     config.provisioning.clone(),
//!     Box::new(HostAccessPoint::new(mac)),
//!     Box::new(TcpHttpListener::new()),
//!     clock.clone(),
//! );
//! session.start()?;
//! while session.elapsed() < config.provisioning.session_timeout() {
//!     if session.pump(&mut manager)?.restart_due {
//!         break;
//!     }
//! }
//! session.stop();
//! ```

pub mod access_point;
pub mod http;
pub mod page;
pub mod session;
pub mod tcp;

pub use access_point::{derive_ssid, AccessPoint, ApAddressing, HostAccessPoint};
pub use http::{
    HttpListener, HttpRequest, HttpResponse, MemoryListener, Method, ProvisionForm,
    ProvisionResponse,
};
pub use session::{Heartbeat, ProvisioningSession, Pump, ServedRequest, SessionPhase};
pub use tcp::TcpHttpListener;
