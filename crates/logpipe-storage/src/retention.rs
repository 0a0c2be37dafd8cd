//! Age-based retention policy.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Default number of days partitions are kept.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 90;

/// Decides which partition dates have aged out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Partitions older than this many days are deleted.
    pub max_age_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }
}

impl RetentionPolicy {
    /// Creates a policy keeping `max_age_days` days.
    #[must_use]
    pub const fn new(max_age_days: u32) -> Self {
        Self { max_age_days }
    }

    /// Returns the earliest date that survives a sweep run on `today`.
    ///
    /// Pass the result as `before` to
    /// [`LogArchive::delete_logs`](crate::LogArchive::delete_logs).
    #[must_use]
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.max_age_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Returns true if a partition dated `date` would be deleted on `today`.
    #[must_use]
    pub fn is_expired(&self, date: NaiveDate, today: NaiveDate) -> bool {
        date < self.cutoff(today)
    }
}
