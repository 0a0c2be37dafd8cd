//! # logpipe-storage
//!
//! Compressed, date-partitioned archival of log events without a database.
//!
//! This crate provides:
//!
//! - [`LogArchive`] - Store, append, range-read, delete and summarize partitions
//! - [`ObjectStore`] - Whole-object storage seam, with [`FsObjectStore`] and [`MemoryObjectStore`]
//! - [`PartitionKey`] - `<namespace>/<resource>/<YYYY>/<MM>/<DD>.jsonl.gz` keys
//! - [`RetentionPolicy`] - Age-based deletion cutoff
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use logpipe_storage::{ArchiveConfig, FsObjectStore, LogArchive, RetentionPolicy};
//!
//! # fn main() -> logpipe_storage::Result<()> {
//! let store = FsObjectStore::open("/var/lib/logpipe")?;
//! let archive = LogArchive::new(Arc::new(store), ArchiveConfig::default())?;
//!
//! let today = Utc::now().date_naive();
//! let events = archive.get_logs("r1", today, today)?;
//! println!("{} events", events.len());
//!
//! let cutoff = RetentionPolicy::default().cutoff(today);
//! archive.delete_logs("r1", cutoff)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod error;
pub mod object_store;
pub mod partition;
pub mod retention;

// Re-export main types
pub use archive::{ArchiveConfig, DeleteReport, LogArchive, Page, PartitionInfo, PartitionStats};
pub use error::{Result, StorageError};
pub use object_store::{FsObjectStore, MemoryObjectStore, ObjectMeta, ObjectStore};
pub use partition::{
    PARTITION_SUFFIX, PartitionKey, resource_prefix, validate_namespace, validate_resource_id,
};
pub use retention::{DEFAULT_MAX_AGE_DAYS, RetentionPolicy};
