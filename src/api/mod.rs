//! Posture analysis HTTP API.
//!
//! A small HTTP/1.1 server: one request per connection, JSON in
//! and out, permissive CORS so browser clients can call it directly.

use crate::analysis::{
    ImageAnalysisRequest, InvalidInputData, PostureService, VideoAnalysisRequest,
};
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_HEADER_BYTES: usize = 8192;
/// Upper bound on rejected body bytes read back before closing the socket.
const MAX_DRAIN_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_MAX_CONNECTIONS: usize = 4;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_body_bytes: usize,
    /// Connections handled concurrently; further clients wait in the listen backlog.
    pub max_connections: usize,
    pub read_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            read_timeout: Duration::from_secs(10),
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
    /// Stop accepting connections and wait for in-flight requests to finish.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    service: PostureService,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, service: PostureService) -> Self {
        Self { cfg, service }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let service = self.service;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, service, shutdown_thread) {
                log::error!("posture api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    service: PostureService,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let max_connections = cfg.max_connections.max(1);
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    let result = loop {
        if shutdown.load(Ordering::SeqCst) {
            break Ok(());
        }
        reap_finished(&mut workers);
        if workers.len() >= max_connections {
            std::thread::sleep(Duration::from_millis(10));
            continue;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let cfg = cfg.clone();
                let service = service.clone();
                // Each request owns its detector; nothing is shared between workers.
                workers.push(std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &service, &cfg) {
                        log::warn!("posture api request from {} failed: {:#}", peer, err);
                    }
                }));
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => break Err(err.into()),
        }
    };

    for worker in workers {
        if worker.join().is_err() {
            log::error!("posture api worker panicked");
        }
    }
    result
}

fn reap_finished(workers: &mut Vec<JoinHandle<()>>) {
    let mut i = 0;
    while i < workers.len() {
        if workers[i].is_finished() {
            if workers.swap_remove(i).join().is_err() {
                log::error!("posture api worker panicked");
            }
        } else {
            i += 1;
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    service: &PostureService,
    cfg: &ApiConfig,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(cfg.read_timeout))?;

    let request = match read_request(&mut stream, cfg.max_body_bytes)? {
        RequestRead::Complete(request) => request,
        RequestRead::TooLarge { declared, buffered } => {
            write_json(&mut stream, 413, &json!({ "error": "payload_too_large" }))?;
            stream.shutdown(Shutdown::Write)?;
            // Unread input would make the close a reset and discard the 413.
            discard_body(&mut stream, declared.saturating_sub(buffered));
            return Err(anyhow!("request body of {} bytes exceeds limit", declared));
        }
    };
    log::info!("{} {}", request.method, request.path);

    if request.method == "OPTIONS" {
        return write_response(&mut stream, 204, "application/json", &[]);
    }

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_json(
            &mut stream,
            200,
            &json!({ "message": "Posture Detection API is running" }),
        ),
        ("GET", "/health") => write_json(&mut stream, 200, &json!({ "status": "ok" })),
        ("POST", "/analyze-posture") => {
            let body: ImageAnalysisRequest = match parse_body(&mut stream, &request)? {
                Some(body) => body,
                None => return Ok(()),
            };
            match service.analyze_image(&body) {
                Ok(response) => write_json(&mut stream, 200, &response),
                Err(err) => {
                    log::error!("error processing image: {:#}", err);
                    write_json(&mut stream, 500, &json!({ "error": "internal_error" }))
                }
            }
        }
        ("POST", "/analyze-video") => {
            let body: VideoAnalysisRequest = match parse_body(&mut stream, &request)? {
                Some(body) => body,
                None => return Ok(()),
            };
            match service.analyze_video(&body) {
                Ok(response) => write_json(&mut stream, 200, &response),
                Err(err) => match err.downcast_ref::<InvalidInputData>() {
                    Some(input) => {
                        log::warn!("rejected video payload: {}", input);
                        write_json(
                            &mut stream,
                            400,
                            &json!({ "error": input.code, "detail": input.message }),
                        )
                    }
                    None => {
                        log::error!("error processing video: {:#}", err);
                        write_json(&mut stream, 500, &json!({ "error": "internal_error" }))
                    }
                },
            }
        }
        (_, "/") | (_, "/health") | (_, "/analyze-posture") | (_, "/analyze-video") => {
            write_json(&mut stream, 405, &json!({ "error": "method_not_allowed" }))
        }
        _ => write_json(&mut stream, 404, &json!({ "error": "not_found" })),
    }
}

/// Deserialize a JSON body, answering 422 on failure.
fn parse_body<T: serde::de::DeserializeOwned>(
    stream: &mut TcpStream,
    request: &HttpRequest,
) -> Result<Option<T>> {
    match serde_json::from_slice(&request.body) {
        Ok(body) => Ok(Some(body)),
        Err(err) => {
            log::error!("validation error for {}: {}", request.path, err);
            write_json(
                stream,
                422,
                &json!({ "error": "invalid_request", "detail": err.to_string() }),
            )?;
            Ok(None)
        }
    }
}

enum RequestRead {
    Complete(HttpRequest),
    TooLarge { declared: usize, buffered: usize },
}

fn read_request(stream: &mut TcpStream, max_body_bytes: usize) -> Result<RequestRead> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let text = String::from_utf8_lossy(&data[..header_end]);
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

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > max_body_bytes {
        return Ok(RequestRead::TooLarge {
            declared: content_length,
            buffered: data.len() - (header_end + 4),
        });
    }

    let mut body = data[header_end + 4..].to_vec();
    body.truncate(content_length);
    let mut remaining = content_length - body.len();
    while remaining > 0 {
        let n = stream.read(&mut buf[..remaining.min(4096)])?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of body"));
        }
        body.extend_from_slice(&buf[..n]);
        remaining -= n;
    }

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(RequestRead::Complete(HttpRequest {
        method: method.to_string(),
        path,
        body,
    }))
}

/// Read and drop up to `remaining` body bytes, stopping early on EOF, a read
/// error or timeout, or `MAX_DRAIN_BYTES`.
fn discard_body(stream: &mut TcpStream, remaining: usize) {
    let mut buf = [0u8; 8192];
    let mut left = remaining.min(MAX_DRAIN_BYTES);
    while left > 0 {
        match stream.read(&mut buf[..left.min(8192)]) {
            Ok(0) | Err(_) => break,
            Ok(n) => left -= n,
        }
    }
}

fn write_json<T: Serialize>(stream: &mut TcpStream, status: u16, body: &T) -> Result<()> {
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
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        422 => "HTTP/1.1 422 Unprocessable Entity",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: *\r\n\
         Cache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}
