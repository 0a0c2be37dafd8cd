//! The producer-side log client.
//!
//! This module provides:
//! - [`LogClient`] - Non-blocking event intake backed by a bounded buffer
//! - [`LogClientBuilder`] - Assembles a client from transports and limits
//!
//! Callers never wait on delivery: [`LogClient::log`] either enqueues the
//! event or reports [`ClientError::BufferFull`] immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use logpipe_events::{
    EventMetadata, EventSubtype, EventType, LogEvent, ResourceRef, ResourceType, Severity,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::batcher::{Batcher, CloseReport, Control, FALLBACK_TARGET};
use crate::config::{ClientConfig, DEFAULT_BATCH_SIZE, DEFAULT_BUFFER_CAPACITY, DEFAULT_FLUSH_INTERVAL_MS};
use crate::error::{ClientError, Result};
use crate::stats::{ClientStats, StatsCounters};
use crate::transport::Transport;

struct Inner {
    service_name: String,
    source_host: String,
    events: mpsc::Sender<LogEvent>,
    control: mpsc::UnboundedSender<Control>,
    closed: AtomicBool,
    cancel: CancellationToken,
    stats: Arc<StatsCounters>,
    batcher: Mutex<Option<JoinHandle<CloseReport>>>,
}

/// Buffered, batching log client.
///
/// Cheap to clone; clones share one buffer and one background batcher.
#[derive(Clone)]
pub struct LogClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogClient")
            .field("service_name", &self.inner.service_name)
            .field("source_host", &self.inner.source_host)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl LogClient {
    /// Creates a builder for the given service.
    #[must_use]
    pub fn builder(service_name: impl Into<String>) -> LogClientBuilder {
        LogClientBuilder::new(service_name)
    }

    /// Creates a client from configuration, connecting every transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, lists no transports, or a
    /// transport cannot be opened.
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Self::builder(config.service_name.clone())
            .source_host(config.resolved_source_host())
            .buffer_capacity(config.buffer_capacity)
            .batch_size(config.batch_size)
            .flush_interval(config.flush_interval());
        for transport in &config.transports {
            builder = builder.transport(Transport::connect(transport).await?);
        }
        builder.build()
    }

    /// Returns the producing service name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// Returns true once [`LogClient::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> ClientStats {
        self.inner.stats.snapshot()
    }

    /// Records one event.
    ///
    /// Never blocks. A malformed or empty `resource_id` is replaced with a
    /// generated identifier and reported as a warning rather than rejected.
    ///
    /// # Errors
    ///
    /// - [`ClientError::BufferFull`] if the buffer is saturated; the event is dropped
    /// - [`ClientError::Closed`] after [`LogClient::close`]
    /// - [`ClientError::InvalidEvent`] for a blank message or mismatched type
    #[allow(clippy::too_many_arguments)]
    pub fn log(
        &self,
        event_type: EventType,
        subtype: EventSubtype,
        resource_type: ResourceType,
        resource_id: &str,
        severity: Severity,
        message: impl Into<String>,
        metadata: EventMetadata,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        let (resource_uuid, substituted) = ResourceRef::parse_or_generate(resource_id);
        if substituted {
            self.inner.stats.record_substitution();
            warn!(
                target: FALLBACK_TARGET,
                supplied = resource_id,
                generated = %resource_uuid,
                %subtype,
                "malformed resource id replaced"
            );
        }

        let event = LogEvent::builder()
            .event_type(event_type)
            .subtype(subtype)
            .resource_type(resource_type)
            .resource_id(resource_uuid)
            .severity(severity)
            .message(message)
            .metadata(metadata)
            .source_service(self.inner.service_name.clone())
            .source_host(self.inner.source_host.clone())
            .build()?;

        self.enqueue(event)
    }

    /// Records a prebuilt event.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BufferFull`] or [`ClientError::Closed`].
    pub fn log_event(&self, event: LogEvent) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        self.enqueue(event)
    }

    fn enqueue(&self, event: LogEvent) -> Result<()> {
        match self.inner.events.try_send(event) {
            Ok(()) => {
                self.inner.stats.record_enqueued();
                Ok(())
            }
            Err(TrySendError::Full(event)) => {
                self.inner.stats.record_dropped();
                warn!(
                    target: FALLBACK_TARGET,
                    event_id = %event.id,
                    subtype = %event.event_subtype,
                    "log buffer full, event dropped"
                );
                Err(ClientError::BufferFull)
            }
            Err(TrySendError::Closed(_)) => Err(ClientError::Closed),
        }
    }

    /// Delivers every event enqueued before this call, then returns.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the client is closed.
    pub async fn flush(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let (ack, done) = oneshot::channel();
        self.inner
            .control
            .send(Control::Flush(ack))
            .map_err(|_| ClientError::Closed)?;
        done.await.map_err(|_| ClientError::Closed)
    }

    /// Stops intake, delivers everything still buffered, and closes every
    /// transport in order.
    ///
    /// Calling `close` again returns an empty report.
    pub async fn close(&self) -> CloseReport {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.cancel.cancel();

        let handle = self.inner.batcher.lock().await.take();
        match handle {
            Some(handle) => match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!(target: FALLBACK_TARGET, error = %e, "batcher task failed");
                    CloseReport::default()
                }
            },
            None => CloseReport::default(),
        }
    }
}

/// Builder for [`LogClient`].
#[derive(Debug)]
pub struct LogClientBuilder {
    service_name: String,
    source_host: Option<String>,
    buffer_capacity: usize,
    batch_size: usize,
    flush_interval: Duration,
    transports: Vec<Transport>,
}

impl LogClientBuilder {
    /// Creates a builder with default limits and no transports.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            source_host: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            transports: Vec::new(),
        }
    }

    /// Sets the source host; defaults to the machine hostname.
    #[must_use]
    pub fn source_host(mut self, host: impl Into<String>) -> Self {
        self.source_host = Some(host.into());
        self
    }

    /// Sets the buffer capacity.
    #[must_use]
    pub const fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Sets the size-triggered flush threshold.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the time-triggered flush interval.
    #[must_use]
    pub const fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Adds a transport. Batches reach transports in the order added.
    #[must_use]
    pub fn transport(mut self, transport: impl Into<Transport>) -> Self {
        self.transports.push(transport.into());
        self
    }

    /// Builds the client and starts its batcher.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NoRuntime`] when called outside a tokio runtime
    /// - [`ClientError::Config`] for invalid limits or no transports
    pub fn build(self) -> Result<LogClient> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let mut config = ClientConfig::new(self.service_name)
            .with_buffer_capacity(self.buffer_capacity)
            .with_batch_size(self.batch_size)
            .with_flush_interval_ms(self.flush_interval.as_millis() as u64);
        config.source_host = self.source_host;
        config.validate()?;
        if self.transports.is_empty() {
            return Err(ClientError::Config(
                "at least one transport is required".to_string(),
            ));
        }

        let (events_tx, events_rx) = mpsc::channel(config.buffer_capacity);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(StatsCounters::default());
        let cancel = CancellationToken::new();

        let batcher = Batcher {
            events: events_rx,
            control: control_rx,
            transports: self.transports,
            batch_size: config.batch_size,
            flush_interval: self.flush_interval,
            stats: Arc::clone(&stats),
            cancel: cancel.clone(),
        };
        let handle = runtime.spawn(batcher.run());

        Ok(LogClient {
            inner: Arc::new(Inner {
                source_host: config.resolved_source_host(),
                service_name: config.service_name,
                events: events_tx,
                control: control_tx,
                closed: AtomicBool::new(false),
                cancel,
                stats,
                batcher: Mutex::new(Some(handle)),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::transport::test_support::SharedBuffer;
    use crate::transport::{BrokerTransport, ConsoleTransport, MemoryBroker};
    use uuid::Uuid;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn console() -> (ConsoleTransport, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (ConsoleTransport::with_writer(buffer.clone()), buffer)
    }

    fn broker() -> (BrokerTransport, MemoryBroker) {
        let broker = MemoryBroker::new();
        (
            BrokerTransport::new(broker.clone(), "platform", Duration::from_secs(5)),
            broker,
        )
    }

    fn log_build(client: &LogClient, message: &str) -> Result<()> {
        client.log(
            EventType::Build,
            EventSubtype::BuildLog,
            ResourceType::Build,
            &Uuid::new_v4().to_string(),
            Severity::Info,
            message,
            EventMetadata::new(),
        )
    }

    fn messages(events: &[LogEvent]) -> Vec<String> {
        events.iter().map(|e| e.message.clone()).collect()
    }

    fn broker_messages(broker: &MemoryBroker) -> Vec<String> {
        broker
            .published()
            .iter()
            .map(|m| {
                serde_json::from_slice::<LogEvent>(&m.body)
                    .expect("event body")
                    .message
            })
            .collect()
    }

    #[test]
    fn build_outside_runtime_fails() {
        let (transport, _buffer) = console();
        let result = LogClient::builder("svc").transport(transport).build();
        assert!(matches!(result, Err(ClientError::NoRuntime)));
    }

    #[tokio::test]
    async fn build_requires_transport_and_valid_limits() {
        assert!(matches!(
            LogClient::builder("svc").build(),
            Err(ClientError::Config(_))
        ));

        let (transport, _buffer) = console();
        assert!(matches!(
            LogClient::builder("svc")
                .buffer_capacity(1)
                .batch_size(2)
                .transport(transport)
                .build(),
            Err(ClientError::Config(_))
        ));
    }

    #[tokio::test]
    async fn events_reach_every_transport_in_order() {
        let (console, buffer) = console();
        let (broker_transport, broker) = broker();
        let client = LogClient::builder("builder")
            .source_host("host-a")
            .transport(console)
            .transport(broker_transport)
            .build()
            .expect("client");

        for i in 0..25 {
            log_build(&client, &format!("line {i}")).expect("log");
        }
        client.flush().await.expect("flush");

        let expected: Vec<String> = (0..25).map(|i| format!("line {i}")).collect();
        let events = buffer.events();
        assert_eq!(messages(&events), expected);
        assert_eq!(broker_messages(&broker), expected);
        assert!(events.iter().all(|e| e.source_service == "builder" && e.source_host == "host-a"));

        let stats = client.stats();
        assert_eq!(stats.enqueued, 25);
        assert_eq!(stats.delivered_events, 25);
        assert_eq!(stats.dropped, 0);

        client.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_deliver_each_event_once_in_order() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 500;

        let (broker_transport, broker) = broker();
        let client = LogClient::builder("svc")
            .buffer_capacity(PRODUCERS * PER_PRODUCER)
            .batch_size(50)
            .flush_interval(Duration::from_millis(5))
            .transport(broker_transport)
            .build()
            .expect("client");

        std::thread::scope(|scope| {
            for producer in 0..PRODUCERS {
                let client = client.clone();
                scope.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        log_build(&client, &format!("{producer}:{i}")).expect("log");
                    }
                });
            }
        });
        let report = client.close().await;
        assert!(report.is_clean());

        let published = broker_messages(&broker);
        assert_eq!(published.len(), PRODUCERS * PER_PRODUCER);

        let mut next = [0usize; PRODUCERS];
        for message in &published {
            let (producer, seq) = message.split_once(':').expect("tagged message");
            let producer: usize = producer.parse().expect("producer");
            let seq: usize = seq.parse().expect("sequence");
            assert_eq!(seq, next[producer], "producer {producer} out of order");
            next[producer] += 1;
        }
        assert!(next.iter().all(|&count| count == PER_PRODUCER));
        assert_eq!(client.stats().dropped, 0);
    }

    #[tokio::test]
    async fn overflow_reports_buffer_full_without_blocking() {
        let (console, buffer) = console();
        let client = LogClient::builder("svc")
            .buffer_capacity(2)
            .batch_size(2)
            .transport(console)
            .build()
            .expect("client");

        // No await between calls, so the batcher cannot drain the buffer.
        log_build(&client, "a").expect("first");
        log_build(&client, "b").expect("second");
        assert!(matches!(log_build(&client, "c"), Err(ClientError::BufferFull)));

        let stats = client.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dropped, 1);

        client.flush().await.expect("flush");
        assert_eq!(messages(&buffer.events()), vec!["a", "b"]);
        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn size_trigger_then_tick_delivers_remainder() {
        let (broker_transport, broker) = broker();
        let client = LogClient::builder("svc")
            .buffer_capacity(2)
            .batch_size(2)
            .flush_interval(INTERVAL)
            .transport(broker_transport)
            .build()
            .expect("client");

        log_build(&client, "one").expect("one");
        log_build(&client, "two").expect("two");
        tokio::time::sleep(Duration::from_millis(1)).await;
        log_build(&client, "three").expect("three is buffered, not dropped");

        // The size trigger fired before the first tick.
        assert_eq!(broker_messages(&broker), vec!["one", "two"]);
        assert_eq!(client.stats().delivered_batches, 1);

        tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(broker_messages(&broker), vec!["one", "two", "three"]);

        let stats = client.stats();
        assert_eq!(stats.delivered_batches, 2);
        assert_eq!(stats.dropped, 0);
        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn interval_trigger_delivers_partial_batch() {
        let (broker_transport, broker) = broker();
        let client = LogClient::builder("svc")
            .batch_size(100)
            .flush_interval(INTERVAL)
            .transport(broker_transport)
            .build()
            .expect("client");

        log_build(&client, "lonely").expect("log");
        tokio::time::sleep(INTERVAL / 2).await;
        assert!(broker.published().is_empty());

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(broker_messages(&broker), vec!["lonely"]);
        client.close().await;
    }

    #[tokio::test]
    async fn failing_transport_does_not_block_others() {
        let (failing, failing_broker) = broker();
        failing_broker.set_failing(true);
        let (console, buffer) = console();
        let client = LogClient::builder("svc")
            .batch_size(2)
            .transport(failing)
            .transport(console)
            .build()
            .expect("client");

        for i in 0..6 {
            log_build(&client, &format!("e{i}")).expect("log");
            if i % 2 == 1 {
                client.flush().await.expect("flush");
            }
        }

        assert_eq!(
            messages(&buffer.events()),
            vec!["e0", "e1", "e2", "e3", "e4", "e5"]
        );
        assert!(failing_broker.published().is_empty());

        let stats = client.stats();
        assert_eq!(stats.failed_sends, 3);
        assert_eq!(stats.delivered_batches, 3);
        client.close().await;
    }

    #[tokio::test]
    async fn close_drains_buffer_then_closes_transports() {
        let (broker_transport, broker) = broker();
        let client = LogClient::builder("svc")
            .batch_size(100)
            .flush_interval(Duration::from_secs(3600))
            .transport(broker_transport)
            .build()
            .expect("client");

        for i in 0..5 {
            log_build(&client, &format!("pending {i}")).expect("log");
        }
        let report = client.close().await;

        assert_eq!(report.drained_events, 5);
        assert!(report.is_clean());
        assert_eq!(broker.published().len(), 5);
        assert!(broker.is_closed());
    }

    #[tokio::test]
    async fn closed_client_fails_fast() {
        let (console, _buffer) = console();
        let client = LogClient::builder("svc")
            .transport(console)
            .build()
            .expect("client");

        client.close().await;
        assert!(client.is_closed());
        assert!(matches!(log_build(&client, "late"), Err(ClientError::Closed)));
        assert!(matches!(client.flush().await, Err(ClientError::Closed)));

        let second = client.close().await;
        assert_eq!(second.drained_events, 0);
    }

    #[tokio::test]
    async fn clones_share_one_pipeline() {
        let (console, buffer) = console();
        let client = LogClient::builder("svc")
            .transport(console)
            .build()
            .expect("client");
        let other = client.clone();

        log_build(&client, "from a").expect("log");
        log_build(&other, "from b").expect("log");
        other.flush().await.expect("flush");

        assert_eq!(messages(&buffer.events()), vec!["from a", "from b"]);
        client.close().await;
        assert!(other.is_closed());
    }

    #[tokio::test]
    async fn malformed_resource_id_is_substituted() {
        let (console, buffer) = console();
        let client = LogClient::builder("svc")
            .transport(console)
            .build()
            .expect("client");

        client
            .log(
                EventType::Build,
                EventSubtype::BuildStart,
                ResourceType::Build,
                "build-42",
                Severity::Info,
                "started",
                EventMetadata::new(),
            )
            .expect("substituted, not rejected");
        client.flush().await.expect("flush");

        let events = buffer.events();
        assert_eq!(events.len(), 1);
        assert!(!events[0].resource_id.is_nil());
        assert_eq!(client.stats().substituted_resource_ids, 1);
        client.close().await;
    }

    #[tokio::test]
    async fn invalid_events_are_rejected() {
        let (console, _buffer) = console();
        let client = LogClient::builder("svc")
            .transport(console)
            .build()
            .expect("client");

        let blank = client.log(
            EventType::Build,
            EventSubtype::BuildStart,
            ResourceType::Build,
            &Uuid::new_v4().to_string(),
            Severity::Info,
            "  ",
            EventMetadata::new(),
        );
        assert!(matches!(blank, Err(ClientError::InvalidEvent(_))));

        let mismatch = client.log(
            EventType::Security,
            EventSubtype::BuildStart,
            ResourceType::Build,
            &Uuid::new_v4().to_string(),
            Severity::Info,
            "wrong type",
            EventMetadata::new(),
        );
        assert!(matches!(mismatch, Err(ClientError::InvalidEvent(_))));
        assert_eq!(client.stats().enqueued, 0);
        client.close().await;
    }

    #[tokio::test]
    async fn transport_close_failure_is_reported() {
        struct FailingWriter;
        impl std::io::Write for FailingWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Err(std::io::Error::other("flush failed"))
            }
        }

        let client = LogClient::builder("svc")
            .transport(ConsoleTransport::with_writer(FailingWriter))
            .build()
            .expect("client");
        let report = client.close().await;

        assert_eq!(report.transport_errors.len(), 1);
        assert_eq!(report.transport_errors[0].0, "console");
        assert!(matches!(report.transport_errors[0].1, DeliveryError::Io(_)));
    }

    #[tokio::test]
    async fn from_config_connects_transports() {
        use crate::config::{BrokerTransportConfig, TransportConfig};

        let config = ClientConfig::new("svc")
            .with_source_host("cfg-host")
            .with_transport(TransportConfig::Broker(BrokerTransportConfig::new(
                "memory://",
                "platform",
            )));
        let client = LogClient::from_config(&config).await.expect("client");
        assert_eq!(client.service_name(), "svc");

        log_build(&client, "hello").expect("log");
        client.flush().await.expect("flush");
        assert_eq!(client.stats().delivered_events, 1);
        assert!(client.close().await.is_clean());
    }
}
