//! Minimal HTTP endpoint for health checks and metrics scraping (synchronous)

use crate::config::MetricsConfig;
use crate::metrics::Metrics;
use std::borrow::Cow;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};

/// Status code, content type, and body of one reply
struct Reply {
    status: u16,
    content_type: &'static str,
    body: Cow<'static, str>,
}

impl Reply {
    fn new(status: u16, content_type: &'static str, body: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    fn text(status: u16, body: &'static str) -> Self {
        Self::new(status, "text/plain", body)
    }

    fn json(status: u16, body: &'static str) -> Self {
        Self::new(status, "application/json", body)
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }
}

/// Health server state
pub struct HealthServer {
    metrics: Arc<Metrics>,
    ready: AtomicBool,
    running: AtomicBool,
}

impl HealthServer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            ready: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    /// Flipped on once the front server is accepting, off when draining
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Serve until `stop` is called. Blocking, run on a dedicated thread.
    pub fn run(self: Arc<Self>, config: &MetricsConfig) -> std::io::Result<()> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        info!("Health server listening on {}", config.listen_addr);

        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = self.handle_connection(stream) {
                        error!("Health connection error: {}", e);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    error!("Health server accept error: {}", e);
                }
            }
        }

        info!("Health server stopped");
        Ok(())
    }

    fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;

        let mut request_line = String::new();
        BufReader::new(&stream).read_line(&mut request_line)?;

        let reply = self.route(&request_line);
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            reply.status,
            reply.reason(),
            reply.content_type,
            reply.body.len(),
            reply.body
        );
        stream.write_all(response.as_bytes())?;
        stream.flush()
    }

    /// Map a request line such as "GET /health HTTP/1.1" to its reply
    fn route(&self, request_line: &str) -> Reply {
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
            return Reply::text(400, "Bad Request");
        };

        if method != "GET" {
            return Reply::text(405, "Method Not Allowed");
        }

        match path {
            "/health" | "/healthz" => Reply::json(200, r#"{"status":"healthy"}"#),
            "/ready" | "/readyz" if self.is_ready() => Reply::json(200, r#"{"status":"ready"}"#),
            "/ready" | "/readyz" => Reply::json(503, r#"{"status":"not ready"}"#),
            "/metrics" => Reply::new(200, "text/plain; version=0.0.4", self.metrics.gather()),
            _ => Reply::text(404, "Not Found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> HealthServer {
        HealthServer::new(Arc::new(Metrics::new()))
    }

    #[test]
    fn test_ready_state() {
        let server = server();

        assert!(!server.is_ready());
        assert_eq!(server.route("GET /ready HTTP/1.1\r\n").status, 503);

        server.set_ready(true);
        assert!(server.is_ready());
        assert_eq!(server.route("GET /readyz HTTP/1.1\r\n").status, 200);
    }

    #[test]
    fn test_routes() {
        let server = server();

        let health = server.route("GET /health HTTP/1.1\r\n");
        assert_eq!(health.status, 200);
        assert_eq!(health.body, r#"{"status":"healthy"}"#);

        let metrics = server.route("GET /metrics HTTP/1.1\r\n");
        assert_eq!(metrics.status, 200);
        assert!(metrics.body.contains("shardcache_cmd_get_total"));

        assert_eq!(server.route("GET /nope HTTP/1.1\r\n").status, 404);
        assert_eq!(server.route("POST /health HTTP/1.1\r\n").status, 405);
        assert_eq!(server.route("\r\n").status, 400);
    }
}
