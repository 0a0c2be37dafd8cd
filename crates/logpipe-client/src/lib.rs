//! # logpipe-client
//!
//! Producer-side log client for the platform log pipeline.
//!
//! This crate provides:
//!
//! - [`LogClient`] - Non-blocking intake, bounded buffer, background batching
//! - [`Transport`] - Closed set of delivery sinks (broker, HTTP, console)
//! - [`ClientConfig`] - TOML-loadable configuration
//! - [`ClientStats`] - Enqueue, drop and delivery counters
//!
//! Delivery failures never reach the caller. They are reported through
//! `tracing` under the [`FALLBACK_TARGET`] target and counted in
//! [`ClientStats::failed_sends`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use logpipe_client::{ClientConfig, LogClient};
//!
//! # async fn run() -> logpipe_client::Result<()> {
//! let config = ClientConfig::from_file("logpipe.toml")?;
//! let client = LogClient::from_config(&config).await?;
//!
//! client.build_start("3f2b5c9e-9a7d-4c1e-8f00-1234567890ab", 12, "abc123", "main")?;
//!
//! let report = client.close().await;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batcher;
pub mod client;
pub mod config;
pub mod error;
mod helpers;
pub mod stats;
pub mod transport;

// Re-export main types
pub use batcher::{CloseReport, FALLBACK_TARGET};
pub use client::{LogClient, LogClientBuilder};
pub use config::{
    BrokerTransportConfig, ClientConfig, ConsoleStream, ConsoleTransportConfig,
    HttpTransportConfig, TransportConfig,
};
pub use error::{ClientError, DeliveryError, Result};
pub use stats::ClientStats;
pub use transport::{
    BrokerChannel, BrokerMessage, BrokerTransport, ConsoleTransport, HttpTransport, MemoryBroker,
    Transport,
};

#[cfg(feature = "amqp")]
pub use transport::amqp::AmqpChannel;
