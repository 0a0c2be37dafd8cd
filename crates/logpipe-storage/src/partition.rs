//! Partition key encoding.
//!
//! A partition holds every event for one resource on one UTC calendar day and
//! lives at `<namespace>/<resource_id>/<YYYY>/<MM>/<DD>.jsonl.gz`. The date is
//! recoverable from the key alone, so retention never has to open an object.

use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::error::{Result, StorageError};

/// Suffix marking gzip-compressed newline-delimited JSON.
pub const PARTITION_SUFFIX: &str = ".jsonl.gz";

/// Location of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    namespace: String,
    resource_id: String,
    date: NaiveDate,
}

impl PartitionKey {
    /// Creates a key after validating the namespace and resource id.
    ///
    /// # Errors
    ///
    /// Returns an error if either part cannot be used as a key segment.
    pub fn new(namespace: &str, resource_id: &str, date: NaiveDate) -> Result<Self> {
        validate_namespace(namespace)?;
        validate_resource_id(resource_id)?;
        Ok(Self {
            namespace: namespace.to_string(),
            resource_id: resource_id.to_string(),
            date,
        })
    }

    /// Parses a key produced by [`PartitionKey::to_key`].
    ///
    /// Returns `None` for anything that is not a well-formed partition key,
    /// including keys whose date segments do not form a real calendar date.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let stem = key.strip_suffix(PARTITION_SUFFIX)?;
        let segments: Vec<&str> = stem.split('/').collect();
        if segments.len() < 5 {
            return None;
        }
        let n = segments.len();
        let (year, month, day) = (segments[n - 3], segments[n - 2], segments[n - 1]);
        if year.len() != 4 || month.len() != 2 || day.len() != 2 {
            return None;
        }
        if ![year, month, day]
            .iter()
            .all(|s| s.bytes().all(|b| b.is_ascii_digit()))
        {
            return None;
        }
        let date = NaiveDate::from_ymd_opt(
            year.parse().ok()?,
            month.parse().ok()?,
            day.parse().ok()?,
        )?;

        let resource_id = segments[n - 4];
        let namespace = segments[..n - 4].join("/");
        if validate_namespace(&namespace).is_err() || validate_resource_id(resource_id).is_err() {
            return None;
        }

        Some(Self {
            namespace,
            resource_id: resource_id.to_string(),
            date,
        })
    }

    /// Renders the object key.
    #[must_use]
    pub fn to_key(&self) -> String {
        format!(
            "{}{:04}/{:02}/{:02}{PARTITION_SUFFIX}",
            resource_prefix(&self.namespace, &self.resource_id),
            self.date.year(),
            self.date.month(),
            self.date.day()
        )
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the resource identifier.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Returns the partition date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}

/// Returns the listing prefix for every partition of one resource.
#[must_use]
pub fn resource_prefix(namespace: &str, resource_id: &str) -> String {
    format!("{namespace}/{resource_id}/")
}

/// Checks that a resource id is a single safe key segment.
///
/// # Errors
///
/// Returns [`StorageError::InvalidResourceId`] otherwise.
pub fn validate_resource_id(resource_id: &str) -> Result<()> {
    if is_safe_segment(resource_id) {
        Ok(())
    } else {
        Err(StorageError::InvalidResourceId(resource_id.to_string()))
    }
}

/// Checks that a namespace is one or more safe key segments.
///
/// # Errors
///
/// Returns [`StorageError::InvalidNamespace`] otherwise.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if !namespace.is_empty() && namespace.split('/').all(is_safe_segment) {
        Ok(())
    } else {
        Err(StorageError::InvalidNamespace(namespace.to_string()))
    }
}

pub(crate) fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment.len() <= 128
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
