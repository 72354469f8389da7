//! Minimal HTTP front for the audit pipeline.
//!
//! Routes:
//! - `GET /api/health`
//! - `POST /api/detect` with an [`AuditRequest`] JSON body, answered with the
//!   [`crate::AuditReport`] JSON.
//!
//! Connections are served by a fixed pool of worker threads fed through a
//! bounded queue. When every worker is busy and the queue is full, new
//! connections get `503` and are closed. All workers share one immutable rule
//! table through the cloned [`Auditor`].

use crate::audit::{AuditRequest, Auditor};
use crate::config::{DEFAULT_API_ADDR, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_CONNECTIONS};
use crate::detect::validate_detections;
use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const MAX_HEADER_BYTES: usize = 8192;
const SERVICE_NAME: &str = "access-audit";
/// Whole-request budget, independent of the per-read timeout.
const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_body_bytes: usize,
    /// Worker threads, and also the depth of the pending-connection queue.
    pub max_connections: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_API_ADDR.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join().map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    auditor: Auditor,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, auditor: Auditor) -> Self {
        Self { cfg, auditor }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        if self.cfg.max_connections == 0 {
            return Err(anyhow!("api max_connections must be greater than zero"));
        }
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let auditor = self.auditor;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, auditor, shutdown_thread) {
                log::error!("audit api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

type Job = (TcpStream, SocketAddr);

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    auditor: Auditor,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let (tx, rx) = mpsc::sync_channel::<Job>(cfg.max_connections);
    let rx = Arc::new(Mutex::new(rx));
    let workers: Vec<JoinHandle<()>> = (0..cfg.max_connections)
        .map(|_| {
            let rx = rx.clone();
            let auditor = auditor.clone();
            let max_body_bytes = cfg.max_body_bytes;
            std::thread::spawn(move || run_worker(&rx, &auditor, max_body_bytes))
        })
        .collect();

    let result = accept_loop(&listener, &tx, &shutdown);

    drop(tx);
    for worker in workers {
        if worker.join().is_err() {
            log::error!("audit api worker panicked");
        }
    }
    result
}

fn accept_loop(
    listener: &TcpListener,
    tx: &SyncSender<Job>,
    shutdown: &AtomicBool,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => match tx.try_send((stream, peer)) {
                Ok(()) => {}
                Err(TrySendError::Full((stream, peer))) => {
                    log::warn!("audit api busy; refusing connection from {}", peer);
                    if let Err(err) = refuse_busy(stream) {
                        log::debug!("busy response to {} failed: {}", peer, err);
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(anyhow!("audit api workers exited"));
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Answer 503 without handing the connection to a worker. Whatever request
/// bytes already arrived are drained first so closing does not reset the
/// connection before the client reads the response.
fn refuse_busy(mut stream: TcpStream) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(100)))?;
    let mut buf = [0u8; MAX_HEADER_BYTES];
    let _ = stream.read(&mut buf);
    write_error(&mut stream, 503, "server_busy", "too many connections")?;
    stream.shutdown(Shutdown::Write)?;
    Ok(())
}

fn run_worker(rx: &Mutex<Receiver<Job>>, auditor: &Auditor, max_body_bytes: usize) {
    loop {
        let job = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => {
                log::error!("audit api queue lock poisoned");
                return;
            }
        };
        let Ok((stream, peer)) = job else {
            return;
        };
        if let Err(err) = handle_connection(stream, auditor, max_body_bytes) {
            log::warn!("audit api request from {} rejected: {}", peer, err);
        }
    }
}

fn handle_connection(mut stream: TcpStream, auditor: &Auditor, max_body_bytes: usize) -> Result<()> {
    stream.set_nonblocking(false)?;
    let deadline = Instant::now() + REQUEST_DEADLINE;
    let mut request = read_request_head(&mut stream, deadline)?;

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/api/health") => {
            let body = json!({"status": "healthy", "service": SERVICE_NAME});
            write_json_value(&mut stream, 200, &body)
        }
        ("POST", "/api/detect") => {
            let content_length = match request.content_length() {
                Ok(len) => len,
                Err(err) => {
                    write_error(&mut stream, 400, "invalid_content_length", &err.to_string())?;
                    return Err(err);
                }
            };
            if content_length > max_body_bytes {
                write_error(
                    &mut stream,
                    413,
                    "payload_too_large",
                    &format!("body exceeds {} bytes", max_body_bytes),
                )?;
                return Err(anyhow!("request body of {} bytes too large", content_length));
            }
            read_body(&mut stream, &mut request.body, content_length, deadline)?;
            handle_detect(&mut stream, auditor, &request.body)
        }
        (_, "/api/health") | (_, "/api/detect") => {
            write_error(&mut stream, 405, "method_not_allowed", &request.method)
        }
        _ => write_error(&mut stream, 404, "not_found", &request.path),
    }
}

fn handle_detect(stream: &mut TcpStream, auditor: &Auditor, body: &[u8]) -> Result<()> {
    let request: AuditRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(err) => {
            write_error(stream, 400, "invalid_request", &err.to_string())?;
            return Err(anyhow!("invalid request body: {}", err));
        }
    };
    if let Err(err) = validate_detections(&request.detections) {
        write_error(stream, 400, "invalid_request", &err.to_string())?;
        return Err(err.into());
    }
    match auditor.audit(request) {
        Ok(report) => {
            log::info!(
                "audit: {} parameters, {}% ({})",
                report.overall_compliance.total,
                report.overall_compliance.percentage,
                report.overall_compliance.verdict
            );
            let payload = serde_json::to_vec(&report)?;
            write_response(stream, 200, "application/json", &payload)
        }
        Err(err) => {
            write_error(stream, 400, "invalid_input", &err.to_string())?;
            Err(err.into())
        }
    }
}

/// Caps the next read at 2 s and at whatever is left of the request budget.
fn arm_read_timeout(stream: &TcpStream, deadline: Instant) -> Result<()> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(anyhow!("request not received within {:?}", REQUEST_DEADLINE));
    }
    stream.set_read_timeout(Some(remaining.min(Duration::from_secs(2))))?;
    Ok(())
}

fn read_request_head(stream: &mut TcpStream, deadline: Instant) -> Result<HttpRequest> {
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let head_end = loop {
        arm_read_timeout(stream, deadline)?;
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
    };
    let body = data.split_off(head_end + 4);
    let text = String::from_utf8_lossy(&data[..head_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

fn read_body(
    stream: &mut TcpStream,
    body: &mut Vec<u8>,
    content_length: usize,
    deadline: Instant,
) -> Result<()> {
    if body.len() >= content_length {
        body.truncate(content_length);
        return Ok(());
    }
    let mut filled = body.len();
    body.resize(content_length, 0);
    while filled < content_length {
        arm_read_timeout(stream, deadline)?;
        let n = stream
            .read(&mut body[filled..])
            .map_err(|e| anyhow!("incomplete request body: {}", e))?;
        if n == 0 {
            return Err(anyhow!(
                "incomplete request body: {} of {} bytes",
                filled,
                content_length
            ));
        }
        filled += n;
    }
    Ok(())
}

fn write_error(stream: &mut TcpStream, status: u16, error: &str, detail: &str) -> Result<()> {
    write_json_value(stream, status, &json!({"error": error, "detail": detail}))
}

fn write_json_value(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn content_length(&self) -> Result<usize> {
        match self.headers.get("content-length") {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("invalid content-length '{}'", value)),
            None => Err(anyhow!("missing content-length")),
        }
    }
}
