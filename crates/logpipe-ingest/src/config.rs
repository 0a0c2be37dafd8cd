//! Ingest service configuration.
//!
//! Loaded from TOML. Every section is optional and falls back to defaults:
//!
//! ```toml
//! bind_addr = "0.0.0.0:8080"
//! api_key = "secret"
//! log_format = "json"
//!
//! [storage]
//! root = "/var/lib/logpipe"
//! namespace = "logs"
//!
//! [retention]
//! max_age_days = 90
//! sweep_interval_secs = 86400
//!
//! [query]
//! default_limit = 100
//! max_limit = 1000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use logpipe_storage::{ArchiveConfig, DEFAULT_MAX_AGE_DAYS, RetentionPolicy};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Default capacity of the live-stream broadcast channel.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 1024;
/// Default time between retention sweeps: one day.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 86_400;

/// Output format for the service's own diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Where and how partitions are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding the object store.
    pub root: PathBuf,
    /// Top-level key prefix for partitions.
    pub namespace: String,
    /// Attempts per partition write.
    pub write_attempts: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let archive = ArchiveConfig::default();
        Self {
            root: PathBuf::from("./data"),
            namespace: archive.namespace,
            write_attempts: archive.write_attempts,
        }
    }
}

impl StorageSettings {
    /// Archive settings derived from this section.
    #[must_use]
    pub fn archive_config(&self) -> ArchiveConfig {
        ArchiveConfig::new(self.namespace.clone()).with_write_attempts(self.write_attempts)
    }
}

/// Age-based deletion settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Partitions older than this many days are deleted.
    pub max_age_days: u32,
    /// Seconds between sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl RetentionSettings {
    /// The retention policy for this section.
    #[must_use]
    pub const fn policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.max_age_days)
    }

    /// Time between sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Pagination limits for `GET /query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Page size when the request gives none.
    pub default_limit: usize,
    /// Largest page size a request may ask for.
    pub max_limit: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

impl QuerySettings {
    /// Resolves a requested page size against the configured limits.
    #[must_use]
    pub fn resolve_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }
}

/// Configuration for the ingest service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// When set, `POST /ingest` requires this value in `x-api-key`.
    pub api_key: Option<String>,
    /// Capacity of the live-stream channel; slow subscribers skip ahead.
    pub stream_buffer_size: usize,
    /// Diagnostic output format.
    pub log_format: LogFormat,
    /// Storage section.
    pub storage: StorageSettings,
    /// Retention section.
    pub retention: RetentionSettings,
    /// Query section.
    pub query: QuerySettings,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            api_key: None,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            log_format: LogFormat::default(),
            storage: StorageSettings::default(),
            retention: RetentionSettings::default(),
            query: QuerySettings::default(),
        }
    }
}

impl IngestConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Set the required API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the storage root directory.
    #[must_use]
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage.root = root.into();
        self
    }

    /// Set the retention age.
    #[must_use]
    pub const fn with_max_age_days(mut self, days: u32) -> Self {
        self.retention.max_age_days = days;
        self
    }

    /// Set the live-stream channel capacity.
    #[must_use]
    pub const fn with_stream_buffer_size(mut self, size: usize) -> Self {
        self.stream_buffer_size = size;
        self
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            IngestError::Config(format!(
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
    pub fn from_toml(content: &str) -> Result<Self, IngestError> {
        let config: Self =
            toml::from_str(content).map_err(|e| IngestError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(IngestError::Config("api_key cannot be blank".to_string()));
        }
        if self.stream_buffer_size == 0 {
            return Err(IngestError::Config(
                "stream_buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.storage.root.as_os_str().is_empty() {
            return Err(IngestError::Config("storage.root cannot be empty".to_string()));
        }
        logpipe_storage::validate_namespace(&self.storage.namespace)
            .map_err(|e| IngestError::Config(format!("storage.namespace: {e}")))?;
        if self.storage.write_attempts == 0 {
            return Err(IngestError::Config(
                "storage.write_attempts must be greater than 0".to_string(),
            ));
        }
        if self.retention.sweep_interval_secs == 0 {
            return Err(IngestError::Config(
                "retention.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.query.default_limit == 0 || self.query.default_limit > self.query.max_limit {
            return Err(IngestError::Config(format!(
                "query.default_limit must be in 1..={}",
                self.query.max_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.api_key.is_none());
        assert_eq!(config.storage.namespace, "logs");
        assert_eq!(config.storage.write_attempts, 2);
        assert_eq!(config.retention.max_age_days, 90);
        assert_eq!(config.retention.sweep_interval(), Duration::from_secs(86_400));
        assert_eq!(config.query.default_limit, 100);
        assert_eq!(config.query.max_limit, 1000);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = IngestConfig::new("127.0.0.1:9000".parse().unwrap())
            .with_api_key("k")
            .with_storage_root("/tmp/logs")
            .with_max_age_days(7)
            .with_stream_buffer_size(16);

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.storage.root, PathBuf::from("/tmp/logs"));
        assert_eq!(config.retention.policy(), RetentionPolicy::new(7));
        assert_eq!(config.stream_buffer_size, 16);
    }

    #[test]
    fn test_from_toml_full() {
        let config = IngestConfig::from_toml(
            r#"
            bind_addr = "127.0.0.1:7070"
            api_key = "secret"
            log_format = "json"

            [storage]
            root = "/srv/logpipe"
            namespace = "platform-logs"

            [retention]
            max_age_days = 30
            sweep_interval_secs = 3600

            [query]
            default_limit = 50
            max_limit = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr.port(), 7070);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.storage.root, PathBuf::from("/srv/logpipe"));
        assert_eq!(config.storage.archive_config().namespace, "platform-logs");
        assert_eq!(config.retention.max_age_days, 30);
        assert_eq!(config.query.resolve_limit(None), 50);
        assert_eq!(config.query.resolve_limit(Some(5000)), 500);
    }

    #[test]
    fn test_from_toml_empty_uses_defaults() {
        let config = IngestConfig::from_toml("").unwrap();
        assert_eq!(config, IngestConfig::default());
    }

    #[test_case("stream_buffer_size = 0" ; "zero stream buffer")]
    #[test_case("api_key = \"  \"" ; "blank api key")]
    #[test_case("[storage]\nnamespace = \"a/b\"" ; "nested namespace")]
    #[test_case("[storage]\nwrite_attempts = 0" ; "zero write attempts")]
    #[test_case("[retention]\nsweep_interval_secs = 0" ; "zero sweep interval")]
    #[test_case("[query]\ndefault_limit = 2000" ; "default above max")]
    #[test_case("bind_addr = \"not-an-addr\"" ; "bad bind addr")]
    fn test_from_toml_rejects(toml: &str) {
        let err = IngestConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bind_addr = \"127.0.0.1:7071\"").unwrap();

        let config = IngestConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr.port(), 7071);
    }

    #[test]
    fn test_from_missing_file() {
        let err = IngestConfig::from_file("/nonexistent/logpipe-ingest.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
