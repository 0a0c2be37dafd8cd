//! HTTP batch transport.

use std::time::Duration;

use logpipe_events::LogEvent;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::HttpTransportConfig;
use crate::error::{ClientError, DeliveryError};

/// Path appended to the base URL.
pub const INGEST_PATH: &str = "/ingest";
/// Header carrying the static API key.
pub const API_KEY_HEADER: &str = "x-api-key";

const BASE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct IngestBody<'a> {
    events: &'a [LogEvent],
}

/// POSTs each batch as one JSON document to `<base_url>/ingest`.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    max_retries: u32,
    closed: bool,
}

impl HttpTransport {
    /// Creates a transport from its config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &HttpTransportConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{INGEST_PATH}", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            closed: false,
        })
    }

    /// Returns the full ingest URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends the batch. Empty batches succeed without a request.
    ///
    /// Connection failures, timeouts and 5xx responses are retried up to
    /// `max_retries` times with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns the last [`DeliveryError`] once retries are exhausted, or
    /// immediately for non-retryable failures such as 4xx responses.
    pub async fn send(&mut self, batch: &[LogEvent]) -> Result<(), DeliveryError> {
        if self.closed {
            return Err(DeliveryError::Closed);
        }
        if batch.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_vec(&IngestBody { events: batch })?;
        let mut attempt = 0;
        loop {
            match self.post(body.clone()).await {
                Ok(()) => {
                    debug!(endpoint = %self.endpoint, batch_size = batch.len(), attempt, "batch delivered");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = BASE_BACKOFF.saturating_mul(1 << attempt.min(5)).min(MAX_BACKOFF);
                    attempt += 1;
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "retrying batch delivery"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post(&self, body: Vec<u8>) -> Result<(), DeliveryError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Marks the transport closed. Pooled connections are released on drop.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::sample_event;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct Sink {
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
        api_keys: Arc<Mutex<Vec<Option<String>>>>,
        calls: Arc<AtomicUsize>,
        fail_first: usize,
        fail_status: u16,
    }

    async fn ingest(
        State(sink): State<Sink>,
        headers: HeaderMap,
        body: String,
    ) -> (StatusCode, String) {
        let call = sink.calls.fetch_add(1, Ordering::SeqCst);
        sink.api_keys.lock().push(
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        if call < sink.fail_first {
            let status = StatusCode::from_u16(sink.fail_status).expect("valid status");
            return (status, "sink unavailable".to_string());
        }
        sink.bodies
            .lock()
            .push(serde_json::from_str(&body).expect("json body"));
        (StatusCode::OK, String::new())
    }

    async fn spawn_sink(sink: Sink) -> String {
        let app = Router::new().route("/ingest", post(ingest)).with_state(sink);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[test]
    fn endpoint_joins_base_url() {
        let transport =
            HttpTransport::new(&HttpTransportConfig::new("http://logs.local:8080/")).expect("transport");
        assert_eq!(transport.endpoint(), "http://logs.local:8080/ingest");
    }

    #[tokio::test]
    async fn posts_batch_with_api_key() {
        let sink = Sink::default();
        let base = spawn_sink(sink.clone()).await;
        let mut transport =
            HttpTransport::new(&HttpTransportConfig::new(base).with_api_key("k-123")).expect("transport");

        let batch = vec![sample_event("one"), sample_event("two")];
        transport.send(&batch).await.expect("send");

        let bodies = sink.bodies.lock().clone();
        assert_eq!(bodies.len(), 1);
        let events = bodies[0]["events"].as_array().expect("events array");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["message"], "one");
        assert_eq!(sink.api_keys.lock().clone(), vec![Some("k-123".to_string())]);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_request() {
        let sink = Sink::default();
        let base = spawn_sink(sink.clone()).await;
        let mut transport = HttpTransport::new(&HttpTransportConfig::new(base)).expect("transport");

        transport.send(&[]).await.expect("send");
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn client_error_status_carries_body_and_is_not_retried() {
        let sink = Sink {
            fail_first: usize::MAX,
            fail_status: 400,
            ..Sink::default()
        };
        let base = spawn_sink(sink.clone()).await;
        let mut transport =
            HttpTransport::new(&HttpTransportConfig::new(base).with_max_retries(3)).expect("transport");

        let err = transport.send(&[sample_event("x")]).await.expect_err("400");
        match err {
            DeliveryError::Status { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "sink unavailable");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried_within_budget() {
        let sink = Sink {
            fail_first: 2,
            fail_status: 503,
            ..Sink::default()
        };
        let base = spawn_sink(sink.clone()).await;
        let mut transport =
            HttpTransport::new(&HttpTransportConfig::new(base).with_max_retries(2)).expect("transport");

        transport.send(&[sample_event("x")]).await.expect("third attempt succeeds");
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.bodies.lock().len(), 1);
    }

    #[tokio::test]
    async fn server_error_without_retries_fails_once() {
        let sink = Sink {
            fail_first: 1,
            fail_status: 500,
            ..Sink::default()
        };
        let base = spawn_sink(sink.clone()).await;
        let mut transport = HttpTransport::new(&HttpTransportConfig::new(base)).expect("transport");

        let err = transport.send(&[sample_event("x")]).await.expect_err("500");
        assert!(matches!(err, DeliveryError::Status { status: 500, .. }));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connection_refused_is_http_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let mut transport =
            HttpTransport::new(&HttpTransportConfig::new(format!("http://{addr}"))).expect("transport");
        let err = transport.send(&[sample_event("x")]).await.expect_err("refused");
        assert!(matches!(err, DeliveryError::Http(_)));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let mut transport =
            HttpTransport::new(&HttpTransportConfig::new("http://127.0.0.1:9")).expect("transport");
        transport.close();
        assert!(matches!(
            transport.send(&[sample_event("x")]).await,
            Err(DeliveryError::Closed)
        ));
    }
}
