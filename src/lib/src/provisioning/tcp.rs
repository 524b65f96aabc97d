//! HTTP/1.1 listener on a non-blocking TCP socket
//!
//! Serves one connection per round trip with `Connection: close`, which is
//! all a browser needs for a single form. Accepting never blocks. Reading
//! an accepted request is bounded by one deadline for the whole request and
//! by size limits, so a slow client cannot stall the session pump.

use super::http::{HttpListener, HttpRequest, HttpResponse, Method};
use crate::error::CPError;
use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

const MAX_HEADER_BYTES: usize = 16 * 1024;
const MAX_HEADERS: usize = 32;
const MAX_BODY_BYTES: usize = 64 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener bound to a real TCP port.
#[derive(Debug)]
pub struct TcpHttpListener {
    bind_ip: IpAddr,
    request_timeout: Duration,
    listener: Option<TcpListener>,
    in_flight: Option<TcpStream>,
}

impl TcpHttpListener {
    /// Listen on every interface.
    pub fn new() -> Self {
        Self::bind_to(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    pub fn bind_to(bind_ip: IpAddr) -> Self {
        Self {
            bind_ip,
            request_timeout: REQUEST_TIMEOUT,
            listener: None,
            in_flight: None,
        }
    }

    /// Time allowed for a client to deliver its complete request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Address actually bound, useful when started on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}

impl Default for TcpHttpListener {
    fn default() -> Self {
        Self::new()
    }
}

enum ReadOutcome {
    Request(HttpRequest),
    Reject(HttpResponse),
}

/// Request line and the headers that matter here.
#[derive(Debug, PartialEq, Eq)]
struct RequestHead {
    method: Method,
    path: String,
    content_length: usize,
    header_len: usize,
}

/// Parse the request head from the bytes received so far.
///
/// `Ok(None)` means more bytes are needed.
fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, HttpResponse> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    let header_len = match request.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) if buf.len() > MAX_HEADER_BYTES => {
            return Err(HttpResponse::text(413, "Headers too large"));
        }
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(HttpResponse::text(400, &format!("Malformed request: {}", e))),
    };
    let (Some(method), Some(target)) = (request.method, request.path) else {
        return Err(HttpResponse::text(400, "Malformed request line"));
    };

    let mut content_length = None;
    for header in request.headers.iter() {
        if header.name.eq_ignore_ascii_case("transfer-encoding") {
            return Err(HttpResponse::text(501, "Transfer-Encoding not supported"));
        }
        if !header.name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        let len = std::str::from_utf8(header.value)
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .ok_or_else(|| HttpResponse::text(400, "Invalid Content-Length"))?;
        if content_length.is_some_and(|previous| previous != len) {
            return Err(HttpResponse::text(400, "Conflicting Content-Length"));
        }
        content_length = Some(len);
    }
    let content_length = content_length.unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(HttpResponse::text(413, "Body too large"));
    }

    Ok(Some(RequestHead {
        method: Method::parse(method),
        path: target.split('?').next().unwrap_or(target).to_string(),
        content_length,
        header_len,
    }))
}

enum Fill {
    Data,
    Closed,
    TimedOut,
}

/// Read whatever arrives before `deadline` into `buf`.
fn fill(stream: &mut TcpStream, buf: &mut Vec<u8>, deadline: Instant) -> Result<Fill, CPError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Ok(Fill::TimedOut);
    }
    stream.set_read_timeout(Some(remaining))?;

    let mut chunk = [0u8; 1024];
    match stream.read(&mut chunk) {
        Ok(0) => Ok(Fill::Closed),
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            Ok(Fill::Data)
        }
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            Ok(Fill::TimedOut)
        }
        Err(e) if e.kind() == ErrorKind::Interrupted => Ok(Fill::Data),
        Err(e) => Err(e.into()),
    }
}

fn closed_early() -> CPError {
    CPError::ListenerError("Connection closed before request was complete".to_string())
}

fn timed_out() -> HttpResponse {
    HttpResponse::text(408, "Request timeout")
}

fn read_request(stream: &mut TcpStream, timeout: Duration) -> Result<ReadOutcome, CPError> {
    let deadline = Instant::now() + timeout;
    let mut buf = Vec::with_capacity(1024);

    let head = loop {
        match parse_head(&buf) {
            Ok(Some(head)) => break head,
            Ok(None) => {}
            Err(response) => return Ok(ReadOutcome::Reject(response)),
        }
        match fill(stream, &mut buf, deadline)? {
            Fill::Data => {}
            Fill::Closed => return Err(closed_early()),
            Fill::TimedOut => return Ok(ReadOutcome::Reject(timed_out())),
        }
    };

    let mut body = buf.split_off(head.header_len);
    while body.len() < head.content_length {
        match fill(stream, &mut body, deadline)? {
            Fill::Data => {}
            Fill::Closed => return Err(closed_early()),
            Fill::TimedOut => return Ok(ReadOutcome::Reject(timed_out())),
        }
    }
    body.truncate(head.content_length);

    Ok(ReadOutcome::Request(HttpRequest {
        method: head.method,
        path: head.path,
        body,
    }))
}

fn write_response(stream: &mut TcpStream, response: &HttpResponse) -> Result<(), CPError> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.reason(),
        response.content_type,
        response.body.len()
    );
    stream.write_all(head.as_bytes())?;
    stream.write_all(response.body.as_bytes())?;
    stream.flush()?;
    Ok(())
}

impl HttpListener for TcpHttpListener {
    fn start(&mut self, port: u16) -> Result<(), CPError> {
        let listener = TcpListener::bind(SocketAddr::new(self.bind_ip, port)).map_err(|e| {
            CPError::ListenerError(format!("Failed to bind {}:{}: {}", self.bind_ip, port, e))
        })?;
        listener.set_nonblocking(true)?;
        log::info!("HTTP server started on {}", listener.local_addr()?);
        self.listener = Some(listener);
        Ok(())
    }

    fn next_request(&mut self) -> Result<Option<HttpRequest>, CPError> {
        let Some(listener) = &self.listener else {
            return Ok(None);
        };
        let (mut stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        log::debug!("Connection from {}", peer);
        stream.set_nonblocking(false)?;

        match read_request(&mut stream, self.request_timeout) {
            Ok(ReadOutcome::Request(request)) => {
                self.in_flight = Some(stream);
                Ok(Some(request))
            }
            Ok(ReadOutcome::Reject(response)) => {
                log::warn!("Rejected request from {}: {}", peer, response.body);
                write_response(&mut stream, &response).ok();
                Ok(None)
            }
            Err(e) => {
                log::warn!("Dropped connection from {}: {}", peer, e);
                Ok(None)
            }
        }
    }

    fn respond(&mut self, response: HttpResponse) -> Result<(), CPError> {
        let mut stream = self
            .in_flight
            .take()
            .ok_or(CPError::InvalidState("no request in flight"))?;
        write_response(&mut stream, &response)
    }

    fn stop(&mut self) {
        self.in_flight = None;
        if self.listener.take().is_some() {
            log::info!("HTTP server stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.listener.is_some()
    }
}
