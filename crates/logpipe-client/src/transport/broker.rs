//! Topic-exchange broker transport.
//!
//! This module provides:
//! - [`BrokerTransport`] - Publishes each event to a durable topic exchange
//! - [`BrokerChannel`] - Seam over the broker connection
//! - [`MemoryBroker`] - In-process channel that records publishes

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use logpipe_events::{EventType, LogEvent};
use parking_lot::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::error::DeliveryError;

/// Content type of every published body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// One message handed to a [`BrokerChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Exchange to publish to.
    pub exchange: String,
    /// Routing key, `<exchange>.<event_type>`.
    pub routing_key: String,
    /// JSON-encoded event.
    pub body: Vec<u8>,
    /// Routing headers.
    pub headers: BTreeMap<String, String>,
    /// Whether the broker should persist the message.
    pub persistent: bool,
    /// MIME type of the body.
    pub content_type: String,
}

impl BrokerMessage {
    /// Builds the message for one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn for_event(exchange: &str, event: &LogEvent) -> Result<Self, DeliveryError> {
        let body = serde_json::to_vec(event)?;

        let mut headers = BTreeMap::new();
        headers.insert("event_type".to_string(), event.event_type.to_string());
        headers.insert("event_subtype".to_string(), event.event_subtype.to_string());
        headers.insert("severity".to_string(), event.severity.to_string());
        headers.insert("resource_id".to_string(), event.resource_id.to_string());
        if let Some(project_id) = &event.metadata.project_id {
            headers.insert("project_id".to_string(), project_id.clone());
        }
        if let Some(company_id) = &event.metadata.company_id {
            headers.insert("company_id".to_string(), company_id.clone());
        }

        Ok(Self {
            exchange: exchange.to_string(),
            routing_key: routing_key(exchange, event.event_type),
            body,
            headers,
            persistent: true,
            content_type: JSON_CONTENT_TYPE.to_string(),
        })
    }
}

/// Returns the routing key for events of `event_type`.
#[must_use]
pub fn routing_key(exchange: &str, event_type: EventType) -> String {
    format!("{exchange}.{event_type}")
}

/// Connection to a message broker.
#[async_trait]
pub trait BrokerChannel: Send + Sync + fmt::Debug {
    /// Declares a durable topic exchange. Must be idempotent.
    async fn declare_exchange(&self, exchange: &str) -> Result<(), DeliveryError>;

    /// Publishes one message and waits for the broker to accept it.
    async fn publish(&self, message: BrokerMessage) -> Result<(), DeliveryError>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), DeliveryError>;
}

// ============================================================================
// In-memory broker
// ============================================================================

#[derive(Debug)]
struct MemoryBrokerState {
    exchanges: Mutex<BTreeSet<String>>,
    published: Mutex<Vec<BrokerMessage>>,
    /// Publishes succeed while fewer than this many have been recorded.
    fail_after: AtomicUsize,
    closed: AtomicBool,
}

/// In-process broker channel.
///
/// Clones share state, so a test can keep one handle and hand another to a
/// [`BrokerTransport`].
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<MemoryBrokerState>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates an empty broker that accepts every publish.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(MemoryBrokerState {
                exchanges: Mutex::new(BTreeSet::new()),
                published: Mutex::new(Vec::new()),
                fail_after: AtomicUsize::new(usize::MAX),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Makes every publish fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, failing: bool) {
        let limit = if failing { 0 } else { usize::MAX };
        self.state.fail_after.store(limit, Ordering::SeqCst);
    }

    /// Accepts `count` more publishes, then fails the rest.
    pub fn fail_after(&self, count: usize) {
        let recorded = self.state.published.lock().len();
        self.state
            .fail_after
            .store(recorded.saturating_add(count), Ordering::SeqCst);
    }

    /// Returns every message published so far.
    #[must_use]
    pub fn published(&self) -> Vec<BrokerMessage> {
        self.state.published.lock().clone()
    }

    /// Returns the declared exchanges.
    #[must_use]
    pub fn exchanges(&self) -> Vec<String> {
        self.state.exchanges.lock().iter().cloned().collect()
    }

    /// Returns true once the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerChannel for MemoryBroker {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.state.exchanges.lock().insert(exchange.to_string());
        Ok(())
    }

    async fn publish(&self, message: BrokerMessage) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        if !self.state.exchanges.lock().contains(&message.exchange) {
            return Err(DeliveryError::Broker(format!(
                "no exchange '{}'",
                message.exchange
            )));
        }
        let mut published = self.state.published.lock();
        if published.len() >= self.state.fail_after.load(Ordering::SeqCst) {
            return Err(DeliveryError::Broker("publish rejected".to_string()));
        }
        published.push(message);
        Ok(())
    }

    async fn close(&self) -> Result<(), DeliveryError> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Publishes each event of a batch, in order, to a topic exchange.
#[derive(Debug)]
pub struct BrokerTransport {
    channel: Box<dyn BrokerChannel>,
    exchange: String,
    publish_timeout: Duration,
    declared: bool,
    closed: bool,
}

impl BrokerTransport {
    /// Creates a transport over an open channel.
    ///
    /// The exchange is declared lazily on the first send.
    #[must_use]
    pub fn new(
        channel: impl BrokerChannel + 'static,
        exchange: impl Into<String>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            channel: Box::new(channel),
            exchange: exchange.into(),
            publish_timeout,
            declared: false,
            closed: false,
        }
    }

    /// Returns the exchange name.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Publishes every event in the batch.
    ///
    /// # Errors
    ///
    /// The first failed or timed-out publish aborts the batch and is returned;
    /// events after it are not published.
    pub async fn send(&mut self, batch: &[LogEvent]) -> Result<(), DeliveryError> {
        if self.closed {
            return Err(DeliveryError::Closed);
        }
        if batch.is_empty() {
            return Ok(());
        }

        if !self.declared {
            timeout(self.publish_timeout, self.channel.declare_exchange(&self.exchange))
                .await
                .map_err(|_| DeliveryError::Timeout)??;
            self.declared = true;
            debug!(exchange = %self.exchange, "exchange declared");
        }

        for event in batch {
            let message = BrokerMessage::for_event(&self.exchange, event)?;
            timeout(self.publish_timeout, self.channel.publish(message))
                .await
                .map_err(|_| DeliveryError::Timeout)??;
        }
        debug!(exchange = %self.exchange, batch_size = batch.len(), "batch published");
        Ok(())
    }

    /// Closes the broker channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails to close cleanly.
    pub async fn close(&mut self) -> Result<(), DeliveryError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.channel.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::sample_event;
    use logpipe_events::{EventMetadata, EventSubtype, ResourceType, Severity};
    use uuid::Uuid;

    fn transport(broker: &MemoryBroker) -> BrokerTransport {
        BrokerTransport::new(broker.clone(), "platform", Duration::from_secs(5))
    }

    #[test]
    fn routing_key_uses_event_type() {
        assert_eq!(routing_key("platform", EventType::Build), "platform.build");
        assert_eq!(routing_key("logs", EventType::Deployment), "logs.deployment");
    }

    #[test]
    fn message_headers_and_properties() {
        let event = LogEvent::builder()
            .subtype(EventSubtype::DeployRollback)
            .resource_type(ResourceType::Deployment)
            .resource_id(Uuid::new_v4())
            .severity(Severity::Warning)
            .message("rolled back")
            .metadata(EventMetadata::new().with_project_id("p-1"))
            .source_service("deployer")
            .build()
            .expect("event");

        let message = BrokerMessage::for_event("platform", &event).expect("message");
        assert_eq!(message.routing_key, "platform.deployment");
        assert!(message.persistent);
        assert_eq!(message.content_type, "application/json");
        assert_eq!(message.headers["event_type"], "deployment");
        assert_eq!(message.headers["event_subtype"], "deploy_rollback");
        assert_eq!(message.headers["severity"], "warning");
        assert_eq!(message.headers["resource_id"], event.resource_id.to_string());
        assert_eq!(message.headers["project_id"], "p-1");
        assert!(!message.headers.contains_key("company_id"));

        let body: LogEvent = serde_json::from_slice(&message.body).expect("body is the event");
        assert_eq!(body, event);
    }

    #[tokio::test]
    async fn publishes_each_event_in_order() {
        let broker = MemoryBroker::new();
        let mut transport = transport(&broker);

        let batch = vec![sample_event("a"), sample_event("b"), sample_event("c")];
        transport.send(&batch).await.expect("send");

        assert_eq!(broker.exchanges(), vec!["platform".to_string()]);
        let published = broker.published();
        assert_eq!(published.len(), 3);
        for (message, event) in published.iter().zip(&batch) {
            let body: LogEvent = serde_json::from_slice(&message.body).expect("body");
            assert_eq!(body.id, event.id);
        }
    }

    #[tokio::test]
    async fn publish_failure_aborts_batch() {
        let broker = MemoryBroker::new();
        broker.fail_after(1);
        let mut transport = transport(&broker);

        let batch = vec![sample_event("a"), sample_event("b"), sample_event("c")];
        let err = transport.send(&batch).await.expect_err("second publish fails");
        assert!(matches!(err, DeliveryError::Broker(_)));
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test]
    async fn empty_batch_does_not_declare() {
        let broker = MemoryBroker::new();
        let mut transport = transport(&broker);
        transport.send(&[]).await.expect("send");
        assert!(broker.exchanges().is_empty());
    }

    #[derive(Debug)]
    struct StuckChannel;

    #[async_trait]
    impl BrokerChannel for StuckChannel {
        async fn declare_exchange(&self, _exchange: &str) -> Result<(), DeliveryError> {
            Ok(())
        }

        async fn publish(&self, _message: BrokerMessage) -> Result<(), DeliveryError> {
            std::future::pending().await
        }

        async fn close(&self) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_publish_times_out() {
        let mut transport = BrokerTransport::new(StuckChannel, "platform", Duration::from_secs(5));
        let err = transport.send(&[sample_event("a")]).await.expect_err("timeout");
        assert!(matches!(err, DeliveryError::Timeout));
    }

    #[tokio::test]
    async fn close_closes_channel_once() {
        let broker = MemoryBroker::new();
        let mut transport = transport(&broker);
        transport.close().await.expect("close");
        transport.close().await.expect("second close is a no-op");

        assert!(broker.is_closed());
        assert!(matches!(
            transport.send(&[sample_event("late")]).await,
            Err(DeliveryError::Closed)
        ));
    }
}
