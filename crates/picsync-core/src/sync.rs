//! Sync counters shared by batch jobs and sync runs.
//!
//! This module provides pure bookkeeping for per-image outcomes,
//! decoupled from I/O operations and orchestration.

use serde::{Deserialize, Serialize};

/// Outcome of handling a single image field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    /// Image was uploaded and its row upserted (or would have been, in a dry run).
    Synced,
    /// An image row already exists for this record and field.
    Skipped,
    /// Processing failed; the error was logged and the pipeline moved on.
    Failed,
}

/// Counters for a sync job or run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub records_processed: u64,
    pub images_synced: u64,
    pub images_skipped: u64,
    pub errors: u64,
}

impl SyncStats {
    /// Creates a new empty stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one record entering the pipeline.
    pub fn record_seen(&mut self) {
        self.records_processed += 1;
    }

    /// Records an image outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: ImageOutcome) {
        match outcome {
            ImageOutcome::Synced => self.images_synced += 1,
            ImageOutcome::Skipped => self.images_skipped += 1,
            ImageOutcome::Failed => self.errors += 1,
        }
    }

    /// Total number of image fields handled, whatever the outcome.
    pub fn images_total(&self) -> u64 {
        self.images_synced + self.images_skipped + self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}
