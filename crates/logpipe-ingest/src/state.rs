//! Shared state for the ingest service.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use logpipe_events::LogEvent;
use logpipe_storage::{FsObjectStore, LogArchive, StorageError};
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};

/// Shared state for the ingest service.
#[derive(Debug)]
pub struct IngestState {
    /// Service configuration.
    config: Arc<IngestConfig>,
    /// Archive every accepted event is written to.
    archive: Arc<LogArchive>,
    /// Broadcast channel feeding `GET /stream`.
    stream_tx: broadcast::Sender<LogEvent>,
    /// Server start time.
    start_time: Instant,
}

impl IngestState {
    /// Create a new state around an existing archive.
    pub fn new(config: IngestConfig, archive: Arc<LogArchive>) -> Self {
        let (stream_tx, _) = broadcast::channel(config.stream_buffer_size.max(1));
        Self {
            config: Arc::new(config),
            archive,
            stream_tx,
            start_time: Instant::now(),
        }
    }

    /// Create a state backed by a filesystem archive at `config.storage.root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage root cannot be created or the
    /// archive settings are invalid.
    pub fn open(config: IngestConfig) -> IngestResult<Self> {
        let store = FsObjectStore::open(&config.storage.root)?;
        let archive = LogArchive::new(Arc::new(store), config.storage.archive_config())?;
        Ok(Self::new(config, Arc::new(archive)))
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Get a handle to the archive.
    #[must_use]
    pub fn archive(&self) -> Arc<LogArchive> {
        Arc::clone(&self.archive)
    }

    /// Subscribe to newly stored events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.stream_tx.subscribe()
    }

    /// Get the server uptime in seconds.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check a presented API key against the configured one.
    ///
    /// Always succeeds when no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Unauthorized`] on a missing or wrong key.
    pub fn authorize(&self, presented: Option<&str>) -> IngestResult<()> {
        match self.config.api_key.as_deref() {
            None => Ok(()),
            Some(expected) if presented == Some(expected) => Ok(()),
            Some(_) => Err(IngestError::Unauthorized),
        }
    }

    /// Stamps, partitions and stores a batch, then publishes every stored
    /// event to live subscribers.
    ///
    /// Events are grouped by resource and filed under the UTC date of their
    /// `ingested_at`, so retention follows the receiving side's clock and
    /// not the producer's. Each group is appended to its partition. Groups
    /// are written in key order and the first failure stops the batch.
    /// Events from groups written before the failure stay stored and are
    /// still published.
    ///
    /// # Errors
    ///
    /// Returns an error if a partition write fails or the storage task panics.
    pub async fn store_batch(&self, events: Vec<LogEvent>) -> IngestResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let groups = partition_batch(events, Utc::now());
        let archive = self.archive();
        let (stored, failure) = tokio::task::spawn_blocking(move || write_groups(&archive, groups)).await?;

        let count = stored.len();
        for event in stored {
            // No subscribers is not an error.
            let _ = self.stream_tx.send(event);
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(count),
        }
    }
}

type Groups = BTreeMap<(String, NaiveDate), Vec<LogEvent>>;

fn partition_batch(events: Vec<LogEvent>, ingested_at: DateTime<Utc>) -> Groups {
    let date = ingested_at.date_naive();
    let mut groups = Groups::new();
    for event in events {
        let key = (event.resource_id.to_string(), date);
        groups
            .entry(key)
            .or_default()
            .push(event.with_ingested_at(ingested_at));
    }
    groups
}

fn write_groups(archive: &LogArchive, groups: Groups) -> (Vec<LogEvent>, Option<StorageError>) {
    let mut stored = Vec::new();
    for ((resource_id, date), events) in groups {
        match archive.append_logs(&resource_id, date, &events) {
            Ok(info) => {
                debug!(key = %info.key, appended = events.len(), total = info.event_count, "batch group stored");
                stored.extend(events);
            }
            Err(e) => {
                error!(resource_id, %date, events = events.len(), error = %e, "failed to store batch group");
                return (stored, Some(e));
            }
        }
    }
    (stored, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logpipe_events::{EventSubtype, ResourceType, Severity};
    use logpipe_storage::{ArchiveConfig, MemoryObjectStore, RetentionPolicy};
    use uuid::Uuid;

    use crate::retention::RetentionSweeper;

    fn memory_state(config: IngestConfig) -> IngestState {
        let archive =
            LogArchive::new(Arc::new(MemoryObjectStore::new()), ArchiveConfig::default()).unwrap();
        IngestState::new(config, Arc::new(archive))
    }

    fn event_at(resource_id: Uuid, at: DateTime<Utc>, message: &str) -> LogEvent {
        LogEvent::builder()
            .subtype(EventSubtype::DeployStart)
            .resource_type(ResourceType::Deployment)
            .resource_id(resource_id)
            .severity(Severity::Info)
            .message(message)
            .source_service("deployer")
            .source_host("host-1")
            .event_timestamp(at)
            .build()
            .unwrap()
    }

    #[test]
    fn test_authorize_without_key() {
        let state = memory_state(IngestConfig::default());
        assert!(state.authorize(None).is_ok());
        assert!(state.authorize(Some("anything")).is_ok());
    }

    #[test]
    fn test_authorize_with_key() {
        let state = memory_state(IngestConfig::default().with_api_key("secret"));
        assert!(state.authorize(Some("secret")).is_ok());
        assert!(matches!(state.authorize(None), Err(IngestError::Unauthorized)));
        assert!(matches!(state.authorize(Some("wrong")), Err(IngestError::Unauthorized)));
    }

    #[test]
    fn test_partition_batch_files_under_ingestion_day() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let day1 = Utc.with_ymd_and_hms(2025, 1, 15, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2025, 1, 16, 0, 1, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 17, 12, 0, 0).unwrap();

        let groups = partition_batch(
            vec![
                event_at(a, day1, "a1"),
                event_at(a, day2, "a2"),
                event_at(b, day1, "b1"),
                event_at(a, day1, "a3"),
            ],
            now,
        );

        assert_eq!(groups.len(), 2);
        assert!(groups.keys().all(|(_, day)| *day == now.date_naive()));
        let a_group = &groups[&(a.to_string(), now.date_naive())];
        assert_eq!(
            a_group.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
            ["a1", "a2", "a3"]
        );
        assert_eq!(a_group[0].event_timestamp, day1);
        assert!(groups.values().flatten().all(|e| e.ingested_at == Some(now)));
    }

    #[tokio::test]
    async fn test_store_batch_appends_and_publishes() {
        let state = memory_state(IngestConfig::default());
        let mut rx = state.subscribe();
        let rid = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();

        let stored = state
            .store_batch(vec![event_at(rid, at, "first"), event_at(rid, at, "second")])
            .await
            .unwrap();
        assert_eq!(stored, 2);
        state.store_batch(vec![event_at(rid, at, "third")]).await.unwrap();

        let stats = state.archive().get_stats(&rid.to_string()).unwrap();
        assert_eq!(stats.partition_count, 1);
        assert_ne!(stats.oldest_date, Some(at.date_naive()));
        let day = state
            .archive()
            .read_partition(&rid.to_string(), stats.oldest_date.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(
            day.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
            ["first", "second", "third"]
        );
        assert!(day.iter().all(|e| e.ingested_at.is_some()));
        assert!(day.iter().all(|e| e.event_timestamp == at));

        assert_eq!(rx.recv().await.unwrap().message, "first");
        assert_eq!(rx.recv().await.unwrap().message, "second");
        assert_eq!(rx.recv().await.unwrap().message, "third");
    }

    #[tokio::test]
    async fn test_backdated_event_survives_retention() {
        let state = memory_state(IngestConfig::default());
        let rid = Uuid::new_v4();
        let backdated = Utc::now() - chrono::Duration::days(200);

        state
            .store_batch(vec![event_at(rid, backdated, "replayed")])
            .await
            .unwrap();

        let sweeper = RetentionSweeper::new(
            state.archive(),
            RetentionPolicy::new(90),
            std::time::Duration::from_secs(60),
        );
        let report = sweeper.sweep_once(Utc::now().date_naive()).unwrap();

        assert_eq!(report.deleted, 0);
        let page = state.archive().query_page(&rid.to_string(), None, 10, 0).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.events[0].event_timestamp, backdated);
    }

    #[tokio::test]
    async fn test_store_empty_batch() {
        let state = memory_state(IngestConfig::default());
        assert_eq!(state.store_batch(Vec::new()).await.unwrap(), 0);
        assert!(state.archive().list_resources().unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_storage_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("archive");
        let state = IngestState::open(IngestConfig::default().with_storage_root(&root)).unwrap();

        assert!(root.is_dir());
        assert_eq!(state.uptime_secs(), 0);
    }
}
