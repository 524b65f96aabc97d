//! Provisioning session state machine
//!
//! A bounded, caller-driven session that hosts the provisioning form on an
//! isolated access point and commits whatever is submitted through the
//! lifecycle manager.
//!
//! ```text
//!         start()            valid submission
//! Idle ───────────► Active ──────────────────► Completing ── restart_due
//!  ▲                  │                             │
//!  │     time_out()   ▼                             │
//!  └────────────── TimedOut ◄───────────────────────┘
//!        stop()  (from any phase; idempotent)
//! ```
//!
//! Nothing runs in the background. The embedding application calls
//! [`ProvisioningSession::pump`] in its loop; each call serves at most one
//! HTTP round trip and reports heartbeats and the restart deadline.

use super::access_point::{derive_ssid, AccessPoint, ApAddressing};
use super::http::{HttpListener, HttpRequest, HttpResponse, Method, ProvisionForm, ProvisionResponse};
use super::page::PROVISIONING_PAGE;
use crate::config::ProvisioningConfig;
use crate::error::CPError;
use crate::manager::CertificateManager;
use crate::time::TimeSource;
use crate::wifi::CredentialStore;
use std::sync::Arc;
use std::time::Duration;

const MSG_MISSING_FIELDS: &str = "Missing required fields: cert and key";
const MSG_WIFI_FAILED: &str = "Failed to store WiFi credentials";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Active,
    /// Identity committed; waiting out the restart delay
    Completing,
    TimedOut,
}

/// Periodic liveness report while waiting for an installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub elapsed_secs: u64,
    pub clients: usize,
}

/// One request handled during a pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedRequest {
    pub method: Method,
    pub path: String,
    pub status: u16,
}

/// What a single [`ProvisioningSession::pump`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pump {
    pub served: Option<ServedRequest>,
    pub heartbeat: Option<Heartbeat>,
    /// The restart delay after a successful submission has elapsed
    pub restart_due: bool,
}

/// Provisioning session over an access point and an HTTP listener.
pub struct ProvisioningSession {
    config: ProvisioningConfig,
    access_point: Box<dyn AccessPoint>,
    listener: Box<dyn HttpListener>,
    credentials: Option<Box<dyn CredentialStore>>,
    clock: Arc<dyn TimeSource>,
    phase: SessionPhase,
    ssid: String,
    started_at_ms: u64,
    last_heartbeat_ms: u64,
    restart_at_ms: Option<u64>,
}

impl ProvisioningSession {
    pub fn new(
        config: ProvisioningConfig,
        access_point: Box<dyn AccessPoint>,
        listener: Box<dyn HttpListener>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let ssid = derive_ssid(&config.ssid_prefix, &access_point.hardware_id());
        Self {
            config,
            access_point,
            listener,
            credentials: None,
            clock,
            phase: SessionPhase::Idle,
            ssid,
            started_at_ms: 0,
            last_heartbeat_ms: 0,
            restart_at_ms: None,
        }
    }

    /// Accept WiFi credentials on the form and commit them through `store`.
    pub fn with_credential_store(mut self, store: Box<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Bring up the access point and the HTTP listener.
    ///
    /// AP configuration and AP start failures are reported as distinct
    /// errors; either way the session stays [`SessionPhase::Idle`].
    pub fn start(&mut self) -> Result<(), CPError> {
        if self.phase != SessionPhase::Idle {
            return Err(CPError::InvalidState("provisioning session already running"));
        }
        log::info!("Starting provisioning mode");
        let now = self.clock.now_millis()?;

        self.access_point.disconnect_station();

        let addressing = ApAddressing::from_config(&self.config);
        if let Err(e) = self.access_point.configure(&addressing) {
            log::error!("Failed to configure AP IP: {}", e);
            return Err(CPError::AccessPointConfig);
        }
        if let Err(e) = self.access_point.start(&self.ssid) {
            log::error!("Failed to start AP: {}", e);
            return Err(CPError::AccessPointStart);
        }
        if let Err(e) = self.listener.start(self.config.http_port) {
            self.access_point.stop();
            return Err(e);
        }

        self.started_at_ms = now;
        self.last_heartbeat_ms = now;
        self.restart_at_ms = None;
        self.phase = SessionPhase::Active;

        log::info!("===========================================");
        log::info!("AP SSID: {}", self.ssid);
        log::info!("AP IP: {}", addressing.address);
        log::info!("AP Password: (none - open network)");
        log::info!("Visit: http://{}", addressing.address);
        log::info!("===========================================");
        Ok(())
    }

    /// Serve at most one request and report timers.
    ///
    /// Does nothing unless the session is active or completing.
    pub fn pump(&mut self, manager: &mut CertificateManager) -> Result<Pump, CPError> {
        let mut pump = Pump::default();
        match self.phase {
            SessionPhase::Idle | SessionPhase::TimedOut => return Ok(pump),
            SessionPhase::Completing => {
                let now = self.clock.now_millis()?;
                pump.restart_due = self.restart_at_ms.is_some_and(|at| now >= at);
                return Ok(pump);
            }
            SessionPhase::Active => {}
        }
        let now = self.clock.now_millis()?;

        if let Some(request) = self.listener.next_request()? {
            let (response, committed) = self.route(&request, manager);
            let status = response.status;
            // The client may have gone away; a committed identity still
            // schedules the restart.
            if let Err(e) = self.listener.respond(response) {
                log::warn!("Failed to send response for {}: {}", request.path, e);
            }
            pump.served = Some(ServedRequest {
                method: request.method,
                path: request.path,
                status,
            });

            if committed {
                let delay = u64::try_from(self.config.restart_delay().as_millis()).unwrap_or(u64::MAX);
                let restart_at = now.saturating_add(delay);
                self.restart_at_ms = Some(restart_at);
                self.phase = SessionPhase::Completing;
                pump.restart_due = now >= restart_at;
                log::info!(
                    "Provisioning complete, restart in {} seconds",
                    self.config.restart_delay_secs
                );
                return Ok(pump);
            }
        }

        let interval = u64::try_from(self.config.heartbeat_interval().as_millis()).unwrap_or(u64::MAX);
        if now.saturating_sub(self.last_heartbeat_ms) >= interval {
            let heartbeat = Heartbeat {
                elapsed_secs: now.saturating_sub(self.started_at_ms) / 1000,
                clients: self.access_point.client_count(),
            };
            log::info!(
                "Provisioning active for {} seconds, waiting for connection...",
                heartbeat.elapsed_secs
            );
            log::info!("Connected clients to AP: {}", heartbeat.clients);
            self.last_heartbeat_ms = now;
            pump.heartbeat = Some(heartbeat);
        }
        Ok(pump)
    }

    fn route(&mut self, request: &HttpRequest, manager: &mut CertificateManager) -> (HttpResponse, bool) {
        match (&request.method, request.path.as_str()) {
            (Method::Get, "/") => {
                log::info!("Received GET request for /");
                (HttpResponse::html(200, PROVISIONING_PAGE), false)
            }
            (Method::Post, "/provision") => {
                log::info!("Received POST request for /provision");
                self.handle_provision(&request.body, manager)
            }
            _ => {
                log::info!("404 - Not found: {}", request.path);
                (HttpResponse::text(404, "Not found"), false)
            }
        }
    }

    fn handle_provision(&mut self, body: &[u8], manager: &mut CertificateManager) -> (HttpResponse, bool) {
        let form = match ProvisionForm::parse(body) {
            Ok(form) => form,
            Err(e) => {
                log::warn!("{}", e);
                return (error_response("Malformed form data"), false);
            }
        };
        if form.cert.is_empty() || form.key.is_empty() {
            return (error_response(MSG_MISSING_FIELDS), false);
        }

        let mut wifi_stored = false;
        if form.has_wifi_credentials() {
            match self.credentials.as_mut() {
                Some(store) => match store.store_credentials(&form.wifi_ssid, &form.wifi_password) {
                    Ok(()) => {
                        log::info!("WiFi credentials stored successfully");
                        wifi_stored = true;
                    }
                    Err(e) => {
                        log::error!("{}: {}", MSG_WIFI_FAILED, e);
                        return (error_response(MSG_WIFI_FAILED), false);
                    }
                },
                None => log::warn!("WiFi credentials submitted but no credential store configured"),
            }
        }

        match manager.store_certificates(&form.cert, &form.key, form.ca_cert()) {
            Ok(()) => {
                let message = success_message(wifi_stored, self.config.restart_delay_secs);
                let response = ProvisionResponse::success(&message, manager.sensor_name());
                (HttpResponse::json(200, &response), true)
            }
            Err(_) => (error_response(manager.last_error()), false),
        }
    }

    /// Give up waiting. Only an active session times out.
    pub fn time_out(&mut self) {
        if self.phase == SessionPhase::Active {
            log::warn!(
                "Provisioning timed out after {} seconds",
                self.elapsed().as_secs()
            );
            self.phase = SessionPhase::TimedOut;
        }
    }

    /// Halt the listener and the access point. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.phase == SessionPhase::Idle {
            return;
        }
        self.listener.stop();
        self.access_point.stop();
        self.phase = SessionPhase::Idle;
        self.restart_at_ms = None;
        log::info!("Provisioning mode stopped");
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// True from `start` until `stop`.
    pub fn is_provisioning_active(&self) -> bool {
        self.phase != SessionPhase::Idle
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Time since `start`, zero when idle.
    pub fn elapsed(&self) -> Duration {
        if self.phase == SessionPhase::Idle {
            return Duration::ZERO;
        }
        let now = self.clock.now_millis().unwrap_or(self.started_at_ms);
        Duration::from_millis(now.saturating_sub(self.started_at_ms))
    }
}

impl Drop for ProvisioningSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn error_response(message: &str) -> HttpResponse {
    HttpResponse::json(400, &ProvisionResponse::error(message))
}

fn success_message(wifi_stored: bool, restart_delay_secs: u64) -> String {
    if wifi_stored {
        format!(
            "Provisioned successfully! WiFi and certificates stored. Rebooting in {} seconds...",
            restart_delay_secs
        )
    } else {
        format!(
            "Provisioned successfully! Certificates stored. Rebooting in {} seconds...",
            restart_delay_secs
        )
    }
}
