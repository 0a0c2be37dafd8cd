//! Periodic age-based deletion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use logpipe_storage::{LogArchive, RetentionPolicy};
use serde::Serialize;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::IngestResult;

/// Shortest interval the sweeper will run at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Totals from one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Date partitions had to reach to survive.
    pub cutoff: Option<NaiveDate>,
    /// Resources examined.
    pub resources: usize,
    /// Partitions removed.
    pub deleted: usize,
    /// Objects kept because their key did not parse.
    pub retained_unparsable: usize,
    /// Deletions or resources that failed.
    pub failed: usize,
}

/// Applies a [`RetentionPolicy`] to every resource in an archive.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    archive: Arc<LogArchive>,
    policy: RetentionPolicy,
    interval: Duration,
}

impl RetentionSweeper {
    /// Create a sweeper that runs every `interval`.
    ///
    /// Intervals below [`MIN_SWEEP_INTERVAL`] are raised to it.
    #[must_use]
    pub const fn new(archive: Arc<LogArchive>, policy: RetentionPolicy, interval: Duration) -> Self {
        let interval = if interval.as_nanos() < MIN_SWEEP_INTERVAL.as_nanos() {
            MIN_SWEEP_INTERVAL
        } else {
            interval
        };
        Self {
            archive,
            policy,
            interval,
        }
    }

    /// Interval between sweeps.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Deletes every partition older than the policy allows as of `today`.
    ///
    /// A resource that fails is logged and counted; the pass continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive's resources cannot be listed.
    pub fn sweep_once(&self, today: NaiveDate) -> IngestResult<SweepReport> {
        let cutoff = self.policy.cutoff(today);
        let mut report = SweepReport {
            cutoff: Some(cutoff),
            ..SweepReport::default()
        };

        for resource_id in self.archive.list_resources()? {
            report.resources += 1;
            match self.archive.delete_logs(&resource_id, cutoff) {
                Ok(deleted) => {
                    report.deleted += deleted.deleted;
                    report.retained_unparsable += deleted.retained_unparsable;
                    report.failed += deleted.failed;
                }
                Err(e) => {
                    warn!(resource_id, error = %e, "retention failed for resource");
                    report.failed += 1;
                }
            }
        }

        info!(
            %cutoff,
            resources = report.resources,
            deleted = report.deleted,
            failed = report.failed,
            "retention sweep finished"
        );
        Ok(report)
    }

    /// Sweeps once per interval until `cancel` fires.
    ///
    /// The first sweep runs immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);

        info!(
            interval_secs = self.interval.as_secs(),
            max_age_days = self.policy.max_age_days,
            "starting retention sweeper"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let sweeper = self.clone();
                    let today = Utc::now().date_naive();
                    match tokio::task::spawn_blocking(move || sweeper.sweep_once(today)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!(error = %e, "retention sweep failed"),
                        Err(e) => error!(error = %e, "retention sweep task panicked"),
                    }
                }
            }
        }
    }
}
