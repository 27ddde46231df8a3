//! HTTP client for the record-keeping API.
//!
//! - `POST /v1/conversions/start` with a [`ConversionSubject`]
//! - `POST /v1/conversions/finish` with the subject and a [`ConversionResult`]
//!
//! A `409 Conflict` on start means the object is already registered, which
//! happens on redelivery, and counts as success.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::RecordKeepingError;
use super::{ConversionResult, ConversionSubject, RecordKeeper};
use crate::config::RecordKeeperConfig;

const START_PATH: &str = "/v1/conversions/start";
const FINISH_PATH: &str = "/v1/conversions/finish";

#[derive(Serialize)]
struct FinishRequest<'a> {
    #[serde(flatten)]
    subject: &'a ConversionSubject,
    result: &'a ConversionResult,
}

#[derive(Debug, Clone)]
pub struct HttpRecordKeeper {
    client: Client,
    base_url: Url,
    timeout_ms: u64,
}

impl HttpRecordKeeper {
    pub fn new(config: &RecordKeeperConfig) -> Result<Self, RecordKeepingError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RecordKeepingError::configuration(format!("Invalid base URL: {}", e)))?;

        let mut client_builder = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(format!("ingest-consumer/{}", env!("CARGO_PKG_VERSION")));

        if let Some(ref token) = config.auth_token {
            let mut default_headers = reqwest::header::HeaderMap::new();
            default_headers.insert(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", token).parse().map_err(|e| {
                    RecordKeepingError::configuration(format!("Invalid auth token: {}", e))
                })?,
            );
            client_builder = client_builder.default_headers(default_headers);
        }

        let client = client_builder.build().map_err(|e| {
            RecordKeepingError::configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        info!(
            base_url = %config.base_url,
            timeout_ms = config.timeout_ms,
            auth_enabled = config.auth_token.is_some(),
            "Created record keeping client"
        );

        Ok(Self {
            client,
            base_url,
            timeout_ms: config.timeout_ms,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        operation: &str,
        path: &str,
        body: &T,
        accept_conflict: bool,
    ) -> Result<(), RecordKeepingError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| RecordKeepingError::configuration(format!("Failed to construct URL: {}", e)))?;

        debug!(url = %url, operation = %operation, "Calling record keeping API");

        let response = self.client.post(url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                RecordKeepingError::timed_out(operation, self.timeout_ms)
            } else {
                RecordKeepingError::request(operation, e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if accept_conflict && status == StatusCode::CONFLICT {
            debug!(operation = %operation, "Record already registered");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        warn!(operation = %operation, status = %status, error = %body, "Record keeping call failed");
        Err(RecordKeepingError::http_status(operation, status.as_u16(), body))
    }
}

#[async_trait]
impl RecordKeeper for HttpRecordKeeper {
    async fn conversion_started(&self, subject: &ConversionSubject) -> Result<(), RecordKeepingError> {
        self.post("conversion_started", START_PATH, subject, true).await
    }

    async fn conversion_finished(
        &self,
        subject: &ConversionSubject,
        result: &ConversionResult,
    ) -> Result<(), RecordKeepingError> {
        let body = FinishRequest { subject, result };
        self.post("conversion_finished", FINISH_PATH, &body, false)
            .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn subject() -> ConversionSubject {
        ConversionSubject {
            bucket: "alice".to_string(),
            key: "run1/data.root".to_string(),
            size: 1024,
            etag: "abc123".to_string(),
            event_time: DateTime::parse_from_rfc3339("2024-05-01T12:00:00.123+02:00").unwrap(),
        }
    }

    /// Serve one request with a canned status line and return what was received
    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buffer = [0u8; 4096];
            loop {
                let n = socket.read(&mut buffer).await.unwrap();
                received.extend_from_slice(&buffer[..n]);
                let text = String::from_utf8_lossy(&received);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if received.len() >= header_end + 4 + content_length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!("{status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok");
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&received).into_owned()
        });

        (base_url, handle)
    }

    fn keeper(base_url: String, token: Option<&str>) -> HttpRecordKeeper {
        HttpRecordKeeper::new(&RecordKeeperConfig {
            enabled: true,
            base_url,
            auth_token: token.map(str::to_string),
            timeout_ms: 2000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_started_posts_subject_with_bearer_token() {
        let (base_url, server) = serve_once("HTTP/1.1 201 Created").await;
        keeper(base_url, Some("s3cr3t"))
            .conversion_started(&subject())
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/conversions/start HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer s3cr3t"));
        assert!(request.contains(r#""key":"run1/data.root""#));
        assert!(request.contains("2024-05-01T12:00:00.123+02:00"));
    }

    #[tokio::test]
    async fn test_conflict_on_start_is_success() {
        let (base_url, server) = serve_once("HTTP/1.1 409 Conflict").await;
        assert!(keeper(base_url, None)
            .conversion_started(&subject())
            .await
            .is_ok());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_on_finish_is_reported() {
        let (base_url, server) = serve_once("HTTP/1.1 503 Service Unavailable").await;
        let result = ConversionResult::success(0, 2, Duration::from_millis(40));
        let err = keeper(base_url, None)
            .conversion_finished(&subject(), &result)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RecordKeepingError::http_status("conversion_finished", 503, "ok")
        );
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/conversions/finish HTTP/1.1"));
        assert!(request.contains(r#""succeeded":true"#));
        assert!(request.contains(r#""bucket":"alice""#));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = HttpRecordKeeper::new(&RecordKeeperConfig {
            enabled: true,
            base_url: "::not a url".to_string(),
            auth_token: None,
            timeout_ms: 100,
        })
        .unwrap_err();
        assert!(matches!(err, RecordKeepingError::Configuration { .. }));
    }
}
