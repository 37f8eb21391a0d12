//! Progress reporting for batch jobs.
//!
//! The engine emits a [`BatchEvent`] at every lifecycle step. Binaries install
//! [`TracingBatchReporter`] to log them; tests and embedders use
//! [`SilentBatchReporter`] or their own implementation.

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::SyncStats;
use crate::batch::BatchStatus;

// =============================================================================
// Batch Events
// =============================================================================

/// Events emitted by the batch engine during a job.
#[derive(Debug, Clone)]
pub enum BatchEvent<'a> {
    /// The loop started for a new job.
    JobStarted {
        job_id: Uuid,
        total_estimated: Option<u64>,
    },
    /// The loop was rescheduled for a paused job.
    JobResumed { job_id: Uuid, offset: u64 },
    /// A page is about to be fetched.
    BatchStarted {
        job_id: Uuid,
        batch: u64,
        offset: u64,
    },
    /// A page fetch failed and will be retried after `delay_ms`.
    FetchRetry {
        job_id: Uuid,
        attempt: u32,
        delay_ms: u64,
        error: &'a str,
    },
    /// A checkpoint was persisted after a page.
    BatchCompleted {
        job_id: Uuid,
        batch: u64,
        records: usize,
        offset: u64,
        stats: &'a SyncStats,
    },
    /// One image of a record failed; the job continues.
    RecordFailed {
        job_id: Uuid,
        record_id: &'a str,
        field: &'a str,
        error: &'a str,
    },
    /// The job stopped at a checkpoint and can be resumed.
    Paused { job_id: Uuid, offset: u64 },
    /// The job was cancelled.
    Cancelled { job_id: Uuid, stats: &'a SyncStats },
    /// The source was exhausted.
    Finished {
        job_id: Uuid,
        status: BatchStatus,
        stats: &'a SyncStats,
    },
    /// A page fetch or a checkpoint failed; the job is `failed`.
    Failed { job_id: Uuid, error: &'a str },
}

// =============================================================================
// Batch Reporter Trait
// =============================================================================

/// Trait for reporting batch events.
pub trait BatchReporter: Send + Sync {
    /// Called when a batch event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: BatchEvent<'_>) {
        let _ = event;
    }
}

/// Silent reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentBatchReporter;

impl BatchReporter for SilentBatchReporter {}

/// Tracing-based reporter for CLI/server logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBatchReporter;

impl BatchReporter for TracingBatchReporter {
    fn report(&self, event: BatchEvent<'_>) {
        match event {
            BatchEvent::JobStarted {
                job_id,
                total_estimated,
            } => {
                info!(%job_id, total_estimated, "Batch job started");
            }
            BatchEvent::JobResumed { job_id, offset } => {
                info!(%job_id, offset, "Batch job resumed");
            }
            BatchEvent::BatchStarted {
                job_id,
                batch,
                offset,
            } => {
                // Debug level to avoid spam
                tracing::debug!(%job_id, batch, offset, "Fetching batch");
            }
            BatchEvent::FetchRetry {
                job_id,
                attempt,
                delay_ms,
                error,
            } => {
                warn!(%job_id, attempt, delay_ms, %error, "Page fetch failed, retrying");
            }
            BatchEvent::BatchCompleted {
                job_id,
                batch,
                records,
                offset,
                stats,
            } => {
                info!(
                    %job_id,
                    batch,
                    records,
                    offset,
                    synced = stats.images_synced,
                    skipped = stats.images_skipped,
                    errors = stats.errors,
                    "Batch completed"
                );
            }
            BatchEvent::RecordFailed {
                job_id,
                record_id,
                field,
                error,
            } => {
                warn!(%job_id, record_id, field, %error, "Image failed");
            }
            BatchEvent::Paused { job_id, offset } => {
                info!(%job_id, offset, "Batch job paused");
            }
            BatchEvent::Cancelled { job_id, stats } => {
                info!(%job_id, processed = stats.records_processed, "Batch job cancelled");
            }
            BatchEvent::Finished {
                job_id,
                status,
                stats,
            } => {
                info!(
                    %job_id,
                    %status,
                    records = stats.records_processed,
                    synced = stats.images_synced,
                    skipped = stats.images_skipped,
                    errors = stats.errors,
                    "Batch job finished"
                );
            }
            BatchEvent::Failed { job_id, error } => {
                error!(%job_id, %error, "Batch job failed");
            }
        }
    }
}
