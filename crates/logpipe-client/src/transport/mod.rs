//! Delivery transports.
//!
//! A [`Transport`] delivers a batch of events to one sink and owns that
//! sink's connection state. The set of transports is closed:
//! - [`BrokerTransport`] - Publishes to a durable topic exchange
//! - [`HttpTransport`] - POSTs batches to an ingestion endpoint
//! - [`ConsoleTransport`] - Writes JSON lines to a local stream

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod broker;
pub mod console;
pub mod http;

use logpipe_events::LogEvent;
use tracing::info;

pub use broker::{BrokerChannel, BrokerMessage, BrokerTransport, MemoryBroker, routing_key};
pub use console::ConsoleTransport;
pub use http::HttpTransport;

use crate::config::{BrokerTransportConfig, TransportConfig};
use crate::error::{ClientError, DeliveryError};

/// URL scheme selecting the in-process broker.
pub const MEMORY_BROKER_SCHEME: &str = "memory://";

/// One delivery sink.
#[derive(Debug)]
pub enum Transport {
    /// Topic-exchange broker.
    Broker(BrokerTransport),
    /// HTTP ingestion endpoint.
    Http(HttpTransport),
    /// Local stream.
    Console(ConsoleTransport),
}

impl Transport {
    /// Opens the transport described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be created or, for brokers,
    /// the connection cannot be opened.
    pub async fn connect(config: &TransportConfig) -> Result<Self, ClientError> {
        let transport = match config {
            TransportConfig::Http(http) => Self::Http(HttpTransport::new(http)?),
            TransportConfig::Console(console) => Self::Console(ConsoleTransport::new(console.stream)),
            TransportConfig::Broker(broker) => Self::Broker(connect_broker(broker).await?),
        };
        info!(transport = transport.name(), "transport ready");
        Ok(transport)
    }

    /// Returns a short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Broker(_) => "broker",
            Self::Http(_) => "http",
            Self::Console(_) => "console",
        }
    }

    /// Delivers one batch.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] on any non-recoverable failure.
    pub async fn send(&mut self, batch: &[LogEvent]) -> Result<(), DeliveryError> {
        match self {
            Self::Broker(t) => t.send(batch).await,
            Self::Http(t) => t.send(batch).await,
            Self::Console(t) => t.send(batch),
        }
    }

    /// Releases the transport's connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails to close cleanly.
    pub async fn close(&mut self) -> Result<(), DeliveryError> {
        match self {
            Self::Broker(t) => t.close().await,
            Self::Http(t) => {
                t.close();
                Ok(())
            }
            Self::Console(t) => t.close(),
        }
    }
}

impl From<BrokerTransport> for Transport {
    fn from(t: BrokerTransport) -> Self {
        Self::Broker(t)
    }
}

impl From<HttpTransport> for Transport {
    fn from(t: HttpTransport) -> Self {
        Self::Http(t)
    }
}

impl From<ConsoleTransport> for Transport {
    fn from(t: ConsoleTransport) -> Self {
        Self::Console(t)
    }
}

async fn connect_broker(config: &BrokerTransportConfig) -> Result<BrokerTransport, ClientError> {
    if config.url.starts_with(MEMORY_BROKER_SCHEME) {
        return Ok(BrokerTransport::new(
            MemoryBroker::new(),
            config.exchange.clone(),
            config.publish_timeout(),
        ));
    }

    #[cfg(feature = "amqp")]
    if config.url.starts_with("amqp://") || config.url.starts_with("amqps://") {
        let channel = amqp::AmqpChannel::connect(&config.url).await?;
        return Ok(BrokerTransport::new(
            channel,
            config.exchange.clone(),
            config.publish_timeout(),
        ));
    }

    Err(ClientError::Config(format!(
        "unsupported broker url '{}' (amqp:// requires the `amqp` feature)",
        config.url
    )))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsoleTransportConfig, HttpTransportConfig};
    use std::time::Duration;

    #[tokio::test]
    async fn connect_builds_each_kind() {
        let http = Transport::connect(&TransportConfig::Http(HttpTransportConfig::new(
            "http://127.0.0.1:1",
        )))
        .await
        .expect("http");
        assert_eq!(http.name(), "http");

        let console = Transport::connect(&TransportConfig::Console(ConsoleTransportConfig::default()))
            .await
            .expect("console");
        assert_eq!(console.name(), "console");

        let broker = Transport::connect(&TransportConfig::Broker(BrokerTransportConfig::new(
            "memory://",
            "platform",
        )))
        .await
        .expect("broker");
        assert_eq!(broker.name(), "broker");
    }

    #[cfg(not(feature = "amqp"))]
    #[tokio::test]
    async fn amqp_url_without_feature_is_config_error() {
        let err = Transport::connect(&TransportConfig::Broker(BrokerTransportConfig::new(
            "amqp://localhost:5672",
            "platform",
        )))
        .await
        .expect_err("feature disabled");
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[tokio::test]
    async fn enum_dispatch_reaches_variant() {
        let broker = MemoryBroker::new();
        let mut transport: Transport =
            BrokerTransport::new(broker.clone(), "platform", Duration::from_secs(1)).into();

        transport
            .send(&[test_support::sample_event("x")])
            .await
            .expect("send");
        transport.close().await.expect("close");

        assert_eq!(broker.published().len(), 1);
        assert!(broker.is_closed());
    }
}
