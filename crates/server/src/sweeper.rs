//! Retention sweeper: periodically deletes artifacts past their retention window.
//!
//! One sweep lists the store and deletes every entry whose
//! `created_at + retention` is at or before the sweep's clock reading.
//! Sweeps never overlap: the next one is scheduled only after the previous
//! one has finished and logged its stats.

use serde::Serialize;
use spool_core::config::RetentionConfig;
use spool_storage::{ContentStore, DeleteOutcome};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use futures::StreamExt;

/// Counters for one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Entries seen in the listing.
    pub scanned: u64,
    /// Entries past their retention window.
    pub expired: u64,
    /// Expired entries deleted by this sweep.
    pub deleted: u64,
    /// Expired entries that vanished before the delete.
    pub already_absent: u64,
    /// Listing errors, failed deletes and timed-out deletes.
    pub errors: u64,
}

/// Deletes expired artifacts, once or on a schedule.
#[derive(Clone)]
pub struct RetentionSweeper {
    store: Arc<dyn ContentStore>,
    retention: time::Duration,
    interval: Duration,
    delete_timeout: Duration,
    dry_run: bool,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn ContentStore>, config: &RetentionConfig) -> Self {
        Self {
            store,
            retention: config.retention_period(),
            interval: config.sweep_interval(),
            delete_timeout: config.delete_timeout(),
            dry_run: config.dry_run,
        }
    }

    /// Run one sweep against the wall clock.
    pub async fn sweep_once(&self) -> SweepStats {
        self.sweep_at(OffsetDateTime::now_utc()).await
    }

    /// Run one sweep, treating `now` as the current time.
    #[instrument(skip(self), fields(backend = self.store.backend_name(), dry_run = self.dry_run))]
    pub async fn sweep_at(&self, now: OffsetDateTime) -> SweepStats {
        let mut stats = SweepStats::default();
        let mut entries = self.store.list();

        while let Some(entry) = entries.next().await {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // The stream ends by itself once the walk cannot continue
                    error!(error = %e, "Failed to list artifact, continuing sweep");
                    stats.errors += 1;
                    continue;
                }
            };

            stats.scanned += 1;
            if !entry.is_expired(now, self.retention) {
                continue;
            }
            stats.expired += 1;

            if self.dry_run {
                info!(
                    id = %entry.id,
                    created_at = %entry.created_at,
                    "DRY-RUN: would delete expired artifact"
                );
                continue;
            }

            match tokio::time::timeout(self.delete_timeout, self.store.delete(&entry.id)).await {
                Ok(Ok(DeleteOutcome::Deleted)) => {
                    stats.deleted += 1;
                    debug!(id = %entry.id, size = entry.size, "Deleted expired artifact");
                }
                Ok(Ok(DeleteOutcome::AlreadyAbsent)) => {
                    stats.already_absent += 1;
                    info!(id = %entry.id, "Expired artifact already removed");
                }
                Ok(Err(e)) => {
                    stats.errors += 1;
                    error!(id = %entry.id, error = %e, "Failed to delete expired artifact");
                }
                Err(_) => {
                    stats.errors += 1;
                    error!(
                        id = %entry.id,
                        timeout_secs = self.delete_timeout.as_secs(),
                        "Timed out deleting expired artifact"
                    );
                }
            }
        }

        crate::metrics::SWEEP_RUNS.inc();
        crate::metrics::SWEEP_DELETIONS.inc_by(stats.deleted);
        crate::metrics::SWEEP_ERRORS.inc_by(stats.errors);

        info!(
            scanned = stats.scanned,
            expired = stats.expired,
            deleted = stats.deleted,
            already_absent = stats.already_absent,
            errors = stats.errors,
            "Retention sweep completed"
        );

        stats
    }

    /// Start sweeping in the background: once immediately, then every interval.
    ///
    /// Cancelling `cancel` stops the loop, abandoning a sweep in progress.
    pub fn spawn(self, cancel: CancellationToken) -> SweeperHandle {
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                retention_secs = self.retention.whole_seconds(),
                "Retention sweeper started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = self.sweep_once() => {}
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }

            info!("Retention sweeper stopped");
        });

        SweeperHandle { cancel, task }
    }
}

/// Handle to a running sweeper.
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for its task to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Retention sweeper task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
