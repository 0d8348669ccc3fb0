//! Reading sinks - where emitted readings go
//!
//! `ReadingSink` is the seam between the load generator and the ingestion
//! service. Callers own the per-call timeout; a sink only reports whether one
//! reading was accepted.

use crate::domain::{Ack, Reading};
use crate::infra::config::{Config, SinkMode};
use crate::infra::SinkError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Path of the ingestion route on the remote endpoint
pub const READINGS_PATH: &str = "/api/v1/readings";

/// Trait for reading submission adapters
#[async_trait]
pub trait ReadingSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, reading: &Reading) -> Result<Ack, SinkError>;
}

/// Build the sink selected by config
pub fn sink_from_config(config: &Config) -> anyhow::Result<Arc<dyn ReadingSink>> {
    let sink: Arc<dyn ReadingSink> = match config.sink_mode() {
        SinkMode::Http => Arc::new(HttpSink::new(config.sink_url(), config.sink_timeout())?),
        SinkMode::Mock => {
            Arc::new(MockSink::new(config.mock_delay()).with_fail_every(config.mock_fail_every()))
        }
    };
    Ok(sink)
}

/// Send one reading with a fresh per-call deadline. An elapsed deadline is
/// reported as `SinkError::Timeout`.
pub async fn send_bounded(
    sink: &dyn ReadingSink,
    reading: &Reading,
    timeout: Duration,
) -> Result<Ack, SinkError> {
    match tokio::time::timeout(timeout, sink.send(reading)).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout(timeout)),
    }
}

/// HTTP/JSON sink posting each reading to the ingestion endpoint
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct AckBody {
    status: Option<String>,
}

impl HttpSink {
    /// `timeout` is an upper bound enforced by the client itself; callers
    /// still apply their own, possibly tighter, timeout.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder().timeout(timeout).http1_only().build()?;

        Ok(Self { client, endpoint: format!("{}{}", base_url.trim_end_matches('/'), READINGS_PATH) })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReadingSink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, reading: &Reading) -> Result<Ack, SinkError> {
        let response = self.client.post(&self.endpoint).json(reading).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }

        // Body is informational; a 2xx without a parsable body is still accepted
        let status_text = match response.json::<AckBody>().await {
            Ok(AckBody { status: Some(text) }) => text,
            _ => status.to_string(),
        };
        debug!(status = %status_text, "reading_acknowledged");
        Ok(Ack { status: status_text })
    }
}

/// In-process sink for local runs and tests
pub struct MockSink {
    delay: Duration,
    fail_every: u64,
    calls: AtomicU64,
}

impl MockSink {
    pub fn new(delay: Duration) -> Self {
        Self { delay, fail_every: 0, calls: AtomicU64::new(0) }
    }

    /// Fail every Nth call (0 disables failures)
    pub fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }

    /// Number of calls received so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReadingSink for MockSink {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, reading: &Reading) -> Result<Ack, SinkError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        if self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(SinkError::Rejected(format!("mock failure on call {n}")));
        }

        Ok(Ack { status: format!("successfully received {} from {}", reading.sensor_type, reading.id1) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Payload;
    use bytes::Bytes;
    use http_body_util::Full;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use tokio::net::TcpListener;

    /// Serve a fixed reply on 127.0.0.1 and return the base URL
    async fn spawn_ingest(status: StatusCode, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let service = service_fn(move |_req| async move {
                        let mut response = Response::new(Full::new(Bytes::from(body)));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    });
                    let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
                });
            }
        });
        base_url
    }

    async fn send_to(base_url: &str) -> Result<Ack, SinkError> {
        let sink = HttpSink::new(base_url, Duration::from_secs(2)).unwrap();
        sink.send(&Payload::default().to_reading()).await
    }

    #[tokio::test]
    async fn test_http_sink_takes_status_from_body() {
        let base_url = spawn_ingest(StatusCode::OK, r#"{"status":"stored TEMP"}"#).await;
        let ack = send_to(&base_url).await.unwrap();
        assert_eq!(ack.status, "stored TEMP");
    }

    #[tokio::test]
    async fn test_http_sink_accepts_unparsable_success_body() {
        let base_url = spawn_ingest(StatusCode::CREATED, "accepted").await;
        let ack = send_to(&base_url).await.unwrap();
        assert_eq!(ack.status, "201 Created");
    }

    #[tokio::test]
    async fn test_http_sink_rejection_is_status_error() {
        let base_url = spawn_ingest(StatusCode::INTERNAL_SERVER_ERROR, r#"{"status":"rejected"}"#).await;
        let err = send_to(&base_url).await.unwrap_err();
        assert!(matches!(err, SinkError::Status(500)));
    }

    #[tokio::test]
    async fn test_mock_sink_accepts() {
        let sink = MockSink::new(Duration::ZERO);
        let ack = sink.send(&Payload::default().to_reading()).await.unwrap();
        assert!(ack.status.contains("TEMP"));
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_sink_fail_every() {
        let sink = MockSink::new(Duration::ZERO).with_fail_every(3);
        let reading = Payload::default().to_reading();

        let mut failures = 0;
        for _ in 0..9 {
            if sink.send(&reading).await.is_err() {
                failures += 1;
            }
        }
        assert_eq!(failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_bounded_times_out() {
        let sink = MockSink::new(Duration::from_secs(5));
        let err = send_bounded(&sink, &Payload::default().to_reading(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Timeout(d) if d == Duration::from_secs(1)));
    }

    #[test]
    fn test_http_sink_endpoint() {
        let sink = HttpSink::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(sink.endpoint(), "http://localhost:8080/api/v1/readings");
    }

    #[tokio::test]
    async fn test_http_sink_unreachable_is_transport_error() {
        // Port 9 (discard) on loopback is almost never listening
        let sink = HttpSink::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = sink.send(&Payload::default().to_reading()).await.unwrap_err();
        assert!(matches!(err, SinkError::Transport(_)));
    }
}
