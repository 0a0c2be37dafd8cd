//! Client configuration.
//!
//! Configuration for a [`LogClient`](crate::LogClient), including:
//! - Producer identity
//! - Buffer and batching limits
//! - The list of delivery transports

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Default number of events the buffer can hold.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;
/// Default number of events that triggers a flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Default time between flushes, in milliseconds.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_INTERVAL_MS
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_publish_timeout_secs() -> u64 {
    5
}

/// Settings for the HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Base URL of the ingestion service; batches go to `<base_url>/ingest`.
    pub base_url: String,
    /// Static API key sent as `x-api-key`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts for connection errors, timeouts and 5xx responses.
    #[serde(default)]
    pub max_retries: u32,
}

impl HttpTransportConfig {
    /// Creates a config for the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_secs: default_http_timeout_secs(),
            max_retries: 0,
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for the broker transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerTransportConfig {
    /// Broker URL: `amqp://…` (requires the `amqp` feature) or `memory://`.
    pub url: String,
    /// Name of the durable topic exchange.
    pub exchange: String,
    /// Per-publish timeout in seconds.
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
}

impl BrokerTransportConfig {
    /// Creates a config for the given broker and exchange.
    #[must_use]
    pub fn new(url: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: exchange.into(),
            publish_timeout_secs: default_publish_timeout_secs(),
        }
    }

    /// Sets the publish timeout.
    #[must_use]
    pub const fn with_publish_timeout_secs(mut self, secs: u64) -> Self {
        self.publish_timeout_secs = secs;
        self
    }

    /// Returns the publish timeout.
    #[must_use]
    pub const fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

/// Which standard stream the console transport writes to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStream {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
}

/// Settings for the console transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsoleTransportConfig {
    /// Target stream.
    #[serde(default)]
    pub stream: ConsoleStream,
}

/// One configured transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// POST batches to an ingestion endpoint.
    Http(HttpTransportConfig),
    /// Publish events to a topic exchange.
    Broker(BrokerTransportConfig),
    /// Write JSON lines to a local stream.
    Console(ConsoleTransportConfig),
}

impl TransportConfig {
    fn validate(&self) -> Result<(), ClientError> {
        match self {
            Self::Http(http) => {
                if !http.base_url.starts_with("http://") && !http.base_url.starts_with("https://") {
                    return Err(ClientError::Config(format!(
                        "http transport base_url must start with http:// or https://, got '{}'",
                        http.base_url
                    )));
                }
                if http.timeout_secs == 0 {
                    return Err(ClientError::Config(
                        "http transport timeout_secs must be greater than 0".to_string(),
                    ));
                }
            }
            Self::Broker(broker) => {
                if broker.url.is_empty() {
                    return Err(ClientError::Config("broker transport url cannot be empty".to_string()));
                }
                if broker.exchange.trim().is_empty() {
                    return Err(ClientError::Config(
                        "broker transport exchange cannot be empty".to_string(),
                    ));
                }
                if broker.publish_timeout_secs == 0 {
                    return Err(ClientError::Config(
                        "broker transport publish_timeout_secs must be greater than 0".to_string(),
                    ));
                }
            }
            Self::Console(_) => {}
        }
        Ok(())
    }
}

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Name of the service producing events.
    pub service_name: String,
    /// Host name stamped on events; defaults to the machine hostname.
    #[serde(default)]
    pub source_host: Option<String>,
    /// Maximum number of buffered events.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Number of events that triggers an immediate flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum time between flushes, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Delivery transports, in delivery order.
    #[serde(default)]
    pub transports: Vec<TransportConfig>,
}

impl ClientConfig {
    /// Creates a config with defaults and no transports.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            source_host: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            transports: Vec::new(),
        }
    }

    /// Sets the source host.
    #[must_use]
    pub fn with_source_host(mut self, host: impl Into<String>) -> Self {
        self.source_host = Some(host.into());
        self
    }

    /// Sets the buffer capacity.
    #[must_use]
    pub const fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the flush interval.
    #[must_use]
    pub const fn with_flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// Adds a transport.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transports.push(transport);
        self
    }

    /// Returns the flush interval.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Returns the configured host, or the machine hostname.
    #[must_use]
    pub fn resolved_source_host(&self) -> String {
        self.source_host.clone().unwrap_or_else(local_hostname)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ClientError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ClientError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ClientError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.service_name.trim().is_empty() {
            return Err(ClientError::Config("service_name cannot be empty".to_string()));
        }
        if self.buffer_capacity == 0 {
            return Err(ClientError::Config(
                "buffer_capacity must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ClientError::Config("batch_size must be greater than 0".to_string()));
        }
        if self.batch_size > self.buffer_capacity {
            return Err(ClientError::Config(format!(
                "batch_size ({}) cannot exceed buffer_capacity ({})",
                self.batch_size, self.buffer_capacity
            )));
        }
        if self.flush_interval_ms == 0 {
            return Err(ClientError::Config(
                "flush_interval_ms must be greater than 0".to_string(),
            ));
        }
        for transport in &self.transports {
            transport.validate()?;
        }
        Ok(())
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}
