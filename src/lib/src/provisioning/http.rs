//! Minimal HTTP surface of the provisioning session
//!
//! The session only needs three routes and one round trip at a time, so the
//! listener abstraction is deliberately small: hand over the next complete
//! request, take back its response.

use crate::error::CPError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use zeroize::Zeroize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other(String),
}

impl Method {
    pub fn parse(method: &str) -> Self {
        match method {
            "GET" => Method::Get,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }
}

/// A request as seen by the route handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path without the query string
    pub path: String,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.to_string(),
            body: Vec::new(),
        }
    }

    /// POST with an `application/x-www-form-urlencoded` body.
    pub fn post_form(path: &str, fields: &[(&str, &str)]) -> Self {
        let body = serde_urlencoded::to_string(fields).unwrap_or_default();
        Self {
            method: Method::Post,
            path: path.to_string(),
            body: body.into_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    pub fn html(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/html",
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_string(value)
            .unwrap_or_else(|_| r#"{"status":"error","message":"Internal error"}"#.to_string());
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            408 => "Request Timeout",
            413 => "Payload Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Unknown",
        }
    }
}

/// JSON body of a `/provision` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cn: Option<String>,
}

impl ProvisionResponse {
    pub fn success(message: &str, cn: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            cn: Some(cn.to_string()),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: message.to_string(),
            cn: None,
        }
    }
}

/// Fields of the provisioning form. Absent fields decode as empty.
///
/// Key and WiFi password are wiped when the form is dropped.
#[derive(Default, Deserialize)]
pub struct ProvisionForm {
    #[serde(default)]
    pub wifi_ssid: String,
    #[serde(default)]
    pub wifi_password: String,
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub ca_cert: String,
}

impl ProvisionForm {
    /// Decode an `application/x-www-form-urlencoded` body.
    pub fn parse(body: &[u8]) -> Result<Self, CPError> {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| CPError::ListenerError(format!("Malformed form data: {}", e)))
    }

    pub fn has_wifi_credentials(&self) -> bool {
        !self.wifi_ssid.is_empty() && !self.wifi_password.is_empty()
    }

    pub fn ca_cert(&self) -> Option<&str> {
        if self.ca_cert.trim().is_empty() {
            None
        } else {
            Some(&self.ca_cert)
        }
    }
}

impl Drop for ProvisionForm {
    fn drop(&mut self) {
        self.key.zeroize();
        self.wifi_password.zeroize();
    }
}

/// Source of HTTP round trips.
///
/// `next_request` must not block: it returns `Ok(None)` when nothing is
/// waiting. After it returns a request, the next call on the listener is
/// `respond` for that request.
pub trait HttpListener {
    fn start(&mut self, port: u16) -> Result<(), CPError>;
    fn next_request(&mut self) -> Result<Option<HttpRequest>, CPError>;
    fn respond(&mut self, response: HttpResponse) -> Result<(), CPError>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

#[derive(Debug, Default)]
struct MemoryListenerState {
    running: bool,
    port: Option<u16>,
    fail_start: bool,
    fail_respond: bool,
    requests: VecDeque<HttpRequest>,
    responses: Vec<(HttpRequest, HttpResponse)>,
    in_flight: Option<HttpRequest>,
}

/// In-process listener driven by the caller.
///
/// Clones share state: hand one to the session, keep the other to queue
/// requests and read back responses.
#[derive(Debug, Clone, Default)]
pub struct MemoryListener {
    state: Arc<Mutex<MemoryListenerState>>,
}

impl MemoryListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `start` fail.
    pub fn fail_start(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_start = true;
        }
    }

    /// Make every `respond` fail as if the client hung up.
    pub fn fail_responses(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_respond = true;
        }
    }

    /// Queue a request for the next pump.
    pub fn submit(&self, request: HttpRequest) {
        if let Ok(mut state) = self.state.lock() {
            state.requests.push_back(request);
        }
    }

    /// Drain every response sent so far, paired with its request.
    pub fn take_responses(&self) -> Vec<(HttpRequest, HttpResponse)> {
        self.state
            .lock()
            .map(|mut state| std::mem::take(&mut state.responses))
            .unwrap_or_default()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().map(|s| s.requests.len()).unwrap_or(0)
    }

    pub fn port(&self) -> Option<u16> {
        self.state.lock().ok().and_then(|s| s.port)
    }
}

fn poisoned() -> CPError {
    CPError::ListenerError("Lock poisoned".to_string())
}

impl HttpListener for MemoryListener {
    fn start(&mut self, port: u16) -> Result<(), CPError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if state.fail_start {
            return Err(CPError::ListenerError(format!("Port {} unavailable", port)));
        }
        state.running = true;
        state.port = Some(port);
        Ok(())
    }

    fn next_request(&mut self) -> Result<Option<HttpRequest>, CPError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if !state.running {
            return Ok(None);
        }
        let request = state.requests.pop_front();
        state.in_flight = request.clone();
        Ok(request)
    }

    fn respond(&mut self, response: HttpResponse) -> Result<(), CPError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let request = state
            .in_flight
            .take()
            .ok_or(CPError::InvalidState("no request in flight"))?;
        if state.fail_respond {
            return Err(CPError::ListenerError("Client disconnected".to_string()));
        }
        state.responses.push((request, response));
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.running = false;
            state.in_flight = None;
        }
    }

    fn is_running(&self) -> bool {
        self.state.lock().map(|s| s.running).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_decoding() {
        let body = b"wifi_ssid=weather+net&wifi_password=p%40ss&cert=-----BEGIN%20CERTIFICATE-----%0D%0AMIIB&key=k";
        let form = ProvisionForm::parse(body).unwrap();
        assert_eq!(form.wifi_ssid, "weather net");
        assert_eq!(form.wifi_password, "p@ss");
        assert_eq!(form.cert, "-----BEGIN CERTIFICATE-----\r\nMIIB");
        assert_eq!(form.key, "k");
        assert_eq!(form.ca_cert(), None);
        assert!(form.has_wifi_credentials());
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let form = ProvisionForm::parse(b"cert=abc").unwrap();
        assert!(form.key.is_empty());
        assert!(!form.has_wifi_credentials());

        let form = ProvisionForm::parse(b"").unwrap();
        assert!(form.cert.is_empty());
    }

    #[test]
    fn test_post_form_roundtrip() {
        let request = HttpRequest::post_form("/provision", &[("cert", "a b&c"), ("ca_cert", " ")]);
        let form = ProvisionForm::parse(&request.body).unwrap();
        assert_eq!(form.cert, "a b&c");
        assert_eq!(form.ca_cert(), None);
    }

    #[test]
    fn test_provision_response_json() {
        let ok = HttpResponse::json(200, &ProvisionResponse::success("done", "station-01"));
        assert_eq!(ok.content_type, "application/json");
        assert_eq!(
            ok.body,
            r#"{"status":"success","message":"done","cn":"station-01"}"#
        );

        let err = HttpResponse::json(400, &ProvisionResponse::error("bad"));
        assert_eq!(err.body, r#"{"status":"error","message":"bad"}"#);
        assert_eq!(err.reason(), "Bad Request");
    }

    #[test]
    fn test_memory_listener() {
        let handle = MemoryListener::new();
        let mut listener = handle.clone();

        handle.submit(HttpRequest::get("/"));
        assert_eq!(listener.next_request().unwrap(), None, "not started");

        listener.start(80).unwrap();
        assert_eq!(handle.port(), Some(80));
        let request = listener.next_request().unwrap().unwrap();
        assert_eq!(request.path, "/");
        listener.respond(HttpResponse::text(200, "ok")).unwrap();
        assert!(listener.respond(HttpResponse::text(200, "again")).is_err());

        let responses = handle.take_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].1.body, "ok");

        listener.stop();
        assert!(!handle.is_running());
    }
}
