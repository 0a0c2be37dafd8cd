//! Date-partitioned event archive.
//!
//! This module provides:
//! - [`LogArchive`] - Compressed, date-partitioned storage for log events
//! - [`ArchiveConfig`] - Namespace and write behavior
//! - [`PartitionInfo`], [`PartitionStats`], [`DeleteReport`], [`Page`] - Operation results
//!
//! Each partition is a gzip-compressed JSON-lines object holding every event
//! for one resource on one UTC day. Partitions are always written whole.

use std::io::{Read, Write};
use std::sync::Arc;

use chrono::NaiveDate;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use logpipe_events::{LogEvent, ResourceType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, StorageError};
use crate::object_store::ObjectStore;
use crate::partition::{PartitionKey, resource_prefix, validate_namespace, validate_resource_id};

/// Configuration for a [`LogArchive`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Key prefix under which all partitions live.
    pub namespace: String,
    /// How many times a partition write is attempted before giving up.
    pub write_attempts: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            namespace: "logs".to_string(),
            write_attempts: 2,
        }
    }
}

impl ArchiveConfig {
    /// Creates a config with the given namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Sets the number of write attempts.
    #[must_use]
    pub const fn with_write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts;
        self
    }
}

/// Description of a partition that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Object key of the partition.
    pub key: String,
    /// Number of events in the partition.
    pub event_count: usize,
    /// Compressed size in bytes.
    pub compressed_bytes: u64,
}

/// Summary of a resource's partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    /// Sum of compressed partition sizes.
    pub total_bytes: u64,
    /// Number of partitions.
    pub partition_count: usize,
    /// Earliest partition date.
    pub oldest_date: Option<NaiveDate>,
    /// Latest partition date.
    pub newest_date: Option<NaiveDate>,
}

/// Outcome of [`LogArchive::delete_logs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Partitions removed.
    pub deleted: usize,
    /// Objects kept because their key carries no parsable date.
    pub retained_unparsable: usize,
    /// Qualifying partitions that could not be removed.
    pub failed: usize,
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Events on this page, newest first.
    pub events: Vec<LogEvent>,
    /// Total number of matching events across all pages.
    pub total: usize,
}

/// Compressed, date-partitioned archive of log events.
///
/// Writes to one archive are serialized, so concurrent [`LogArchive::append_logs`]
/// calls on the same partition never lose events within a process.
#[derive(Debug)]
pub struct LogArchive {
    store: Arc<dyn ObjectStore>,
    config: ArchiveConfig,
    write_lock: Mutex<()>,
}

impl LogArchive {
    /// Creates an archive over the given object store.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is not a valid key prefix.
    pub fn new(store: Arc<dyn ObjectStore>, config: ArchiveConfig) -> Result<Self> {
        validate_namespace(&config.namespace)?;
        Ok(Self {
            store,
            config: ArchiveConfig {
                write_attempts: config.write_attempts.max(1),
                ..config
            },
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Returns the underlying object store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    fn key_for(&self, resource_id: &str, date: NaiveDate) -> Result<PartitionKey> {
        PartitionKey::new(&self.config.namespace, resource_id, date)
    }

    /// Writes the partition for `(resource_id, date)`, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource id is invalid, an event cannot be
    /// encoded, or the write fails on every attempt.
    pub fn store_logs(
        &self,
        resource_id: &str,
        date: NaiveDate,
        events: &[LogEvent],
    ) -> Result<PartitionInfo> {
        let key = self.key_for(resource_id, date)?;
        let _guard = self.write_lock.lock();
        self.write_partition(&key, events)
    }

    /// Appends events to the partition for `(resource_id, date)`.
    ///
    /// Existing events keep their position ahead of the new ones. The whole
    /// partition is decoded and rewritten on every call, so the cost of an
    /// append grows with the size of the day's partition. Callers should
    /// batch events rather than append them one at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing partition cannot be decoded (it is
    /// left untouched) or the write fails.
    pub fn append_logs(
        &self,
        resource_id: &str,
        date: NaiveDate,
        events: &[LogEvent],
    ) -> Result<PartitionInfo> {
        let key = self.key_for(resource_id, date)?;
        let _guard = self.write_lock.lock();

        let mut combined = match self.store.get(&key.to_key())? {
            Some(bytes) => decode_partition(&key.to_key(), &bytes)?,
            None => Vec::new(),
        };
        combined.extend_from_slice(events);
        self.write_partition(&key, &combined)
    }

    fn write_partition(&self, key: &PartitionKey, events: &[LogEvent]) -> Result<PartitionInfo> {
        let object_key = key.to_key();
        let payload = encode_partition(events)?;

        let mut last_error = None;
        for attempt in 1..=self.config.write_attempts {
            match self.store.put(&object_key, &payload) {
                Ok(()) => {
                    debug!(
                        key = %object_key,
                        events = events.len(),
                        bytes = payload.len(),
                        attempt,
                        "partition written"
                    );
                    return Ok(PartitionInfo {
                        key: object_key,
                        event_count: events.len(),
                        compressed_bytes: payload.len() as u64,
                    });
                }
                Err(e) => {
                    warn!(key = %object_key, attempt, error = %e, "partition write failed");
                    last_error = Some(e);
                }
            }
        }

        Err(StorageError::WriteFailed {
            key: object_key,
            attempts: self.config.write_attempts,
            reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Reads one partition. Returns `None` if it does not exist.
    ///
    /// Malformed lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource id is invalid, the object cannot be
    /// read, or it is not valid gzip data.
    pub fn read_partition(&self, resource_id: &str, date: NaiveDate) -> Result<Option<Vec<LogEvent>>> {
        let key = self.key_for(resource_id, date)?.to_key();
        match self.store.get(&key)? {
            Some(bytes) => decode_partition(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Returns every event for `resource_id` between `start` and `end` inclusive.
    ///
    /// Days without a partition contribute nothing. A partition that cannot
    /// be read is skipped with a warning rather than failing the range.
    /// An inverted range yields no events.
    ///
    /// # Errors
    ///
    /// Returns an error only if the resource id is invalid.
    pub fn get_logs(&self, resource_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<LogEvent>> {
        validate_resource_id(resource_id)?;

        let mut events = Vec::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            match self.read_partition(resource_id, date) {
                Ok(Some(day)) => events.extend(day),
                Ok(None) => {}
                Err(e) => {
                    warn!(resource_id, %date, error = %e, "skipping unreadable partition");
                }
            }
        }
        Ok(events)
    }

    /// Removes every partition of `resource_id` dated strictly before `before`.
    ///
    /// Only keys are inspected; partition contents are never read. Objects
    /// whose key does not parse as a partition are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource id is invalid or listing fails.
    pub fn delete_logs(&self, resource_id: &str, before: NaiveDate) -> Result<DeleteReport> {
        validate_resource_id(resource_id)?;
        let prefix = resource_prefix(&self.config.namespace, resource_id);
        let _guard = self.write_lock.lock();

        let mut report = DeleteReport::default();
        for object in self.store.list(&prefix)? {
            let Some(key) = PartitionKey::parse(&object.key) else {
                warn!(key = %object.key, "retaining object with unparsable partition key");
                report.retained_unparsable += 1;
                continue;
            };
            if key.resource_id() != resource_id || key.date() >= before {
                continue;
            }
            match self.store.delete(&object.key) {
                Ok(_) => report.deleted += 1,
                Err(e) => {
                    warn!(key = %object.key, error = %e, "failed to delete partition");
                    report.failed += 1;
                }
            }
        }

        if report.deleted > 0 {
            info!(resource_id, %before, deleted = report.deleted, "expired partitions deleted");
        }
        Ok(report)
    }

    /// Summarizes the partitions of `resource_id`.
    ///
    /// A resource with no partitions yields zeroed stats.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource id is invalid or listing fails.
    pub fn get_stats(&self, resource_id: &str) -> Result<PartitionStats> {
        validate_resource_id(resource_id)?;
        let prefix = resource_prefix(&self.config.namespace, resource_id);

        let stats = self
            .store
            .list(&prefix)?
            .into_iter()
            .filter_map(|object| {
                PartitionKey::parse(&object.key)
                    .filter(|key| key.resource_id() == resource_id)
                    .map(|key| (key.date(), object.size))
            })
            .fold(PartitionStats::default(), |mut acc, (date, size)| {
                acc.total_bytes += size;
                acc.partition_count += 1;
                acc.oldest_date = Some(acc.oldest_date.map_or(date, |d| d.min(date)));
                acc.newest_date = Some(acc.newest_date.map_or(date, |d| d.max(date)));
                acc
            });
        Ok(stats)
    }

    /// Lists every resource id that has at least one partition.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    pub fn list_resources(&self) -> Result<Vec<String>> {
        let prefix = format!("{}/", self.config.namespace);
        let mut resources: Vec<String> = self
            .store
            .list(&prefix)?
            .into_iter()
            .filter_map(|object| PartitionKey::parse(&object.key))
            .filter(|key| key.namespace() == self.config.namespace)
            .map(|key| key.resource_id().to_string())
            .collect();
        resources.sort();
        resources.dedup();
        Ok(resources)
    }

    /// Returns one page of a resource's events, newest first.
    ///
    /// When `resource_type` is given, only events of that type are counted
    /// and returned. Unreadable partitions are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource id is invalid or listing fails.
    pub fn query_page(
        &self,
        resource_id: &str,
        resource_type: Option<ResourceType>,
        limit: usize,
        offset: usize,
    ) -> Result<Page> {
        validate_resource_id(resource_id)?;
        let prefix = resource_prefix(&self.config.namespace, resource_id);

        let mut keys: Vec<PartitionKey> = self
            .store
            .list(&prefix)?
            .into_iter()
            .filter_map(|object| PartitionKey::parse(&object.key))
            .filter(|key| key.resource_id() == resource_id)
            .collect();
        keys.sort_by(|a, b| b.date().cmp(&a.date()));

        let mut matching = Vec::new();
        for key in &keys {
            let mut day = match self.read_partition(resource_id, key.date()) {
                Ok(Some(day)) => day,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping unreadable partition");
                    continue;
                }
            };
            day.retain(|event| resource_type.is_none_or(|t| event.resource_type == t));
            // Reverse first so equal timestamps keep newest-appended first.
            day.reverse();
            day.sort_by(|a, b| b.event_timestamp.cmp(&a.event_timestamp));
            matching.extend(day);
        }

        let total = matching.len();
        let events = matching.into_iter().skip(offset).take(limit).collect();
        Ok(Page { events, total })
    }
}

fn encode_partition(events: &[LogEvent]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    for event in events {
        let line = event.to_json_line()?;
        encoder.write_all(line.as_bytes())?;
        encoder.write_all(b"\n")?;
    }
    Ok(encoder.finish()?)
}

fn decode_partition(key: &str, bytes: &[u8]) -> Result<Vec<LogEvent>> {
    let mut text = String::new();
    GzDecoder::new(bytes)
        .read_to_string(&mut text)
        .map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

    let mut events = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match LogEvent::from_json_line(line) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(key, line = line_no + 1, error = %e, "skipping malformed event line");
            }
        }
    }
    Ok(events)
}
