//! HTTP transport
//!
//! The dispatcher only needs "POST these bytes, tell me the status and body".
//! Keeping that behind a trait lets the push logic run against a recording
//! fake in tests.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::TelemetryError;

/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// An outgoing POST
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// First header with this name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends HTTP POST requests.
///
/// Implementations return `Err(Transport)` only when no response was
/// received; any status code, including 4xx/5xx, is an `Ok` response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TelemetryError>;
}

/// Transport backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TelemetryError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TelemetryError> {
        // A redirected push must surface as a 3xx failure, never as the
        // status of a follow-up GET
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TelemetryError> {
        let mut builder = self.client.post(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => format!("[Failed to read response body: {e}]"),
        };

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = HttpRequest::new("http://localhost", "")
            .with_header("Content-Type", "text/plain")
            .with_header("Authorization", "Token t");

        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert_eq!(request.header("AUTHORIZATION"), Some("Token t"));
        assert_eq!(request.header("Accept"), None);
    }

    #[test]
    fn test_success_range() {
        let ok = |status| HttpResponse {
            status,
            body: String::new(),
        };
        assert!(ok(200).is_success());
        assert!(ok(204).is_success());
        assert!(!ok(302).is_success());
        assert!(!ok(500).is_success());
    }

    /// Minimal HTTP/1.1 server: POST gets a 302 to `/elsewhere`, anything
    /// else gets `200 ok`. Returns the base URL.
    async fn spawn_redirecting_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                let header_end = loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break None;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos + 4);
                    }
                };
                let Some(header_end) = header_end else { continue };

                let head = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
                let content_length: usize = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);
                while request.len() < header_end + content_length {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }

                let response = if head.starts_with("post") {
                    concat!(
                        "HTTP/1.1 302 Found\r\n",
                        "Location: /elsewhere\r\n",
                        "Content-Length: 5\r\n",
                        "Connection: close\r\n\r\n",
                        "moved"
                    )
                } else {
                    "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_redirect_is_reported_not_followed() {
        let base = spawn_redirecting_server().await;
        let transport = ReqwestTransport::new().unwrap();

        let response = transport
            .post(HttpRequest::new(format!("{base}/metrics/job/j"), "x 1\n"))
            .await
            .unwrap();

        assert_eq!(response.status, 302);
        assert_eq!(response.body, "moved");
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(2)).unwrap();
        // Port 9 on loopback: connection refused without leaving the machine
        let result = transport
            .post(HttpRequest::new("http://127.0.0.1:9/metrics", "x 1\n"))
            .await;
        assert!(matches!(result, Err(TelemetryError::Transport(_))));
    }
}
