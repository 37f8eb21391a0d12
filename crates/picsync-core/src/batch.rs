//! Batch job types: the state machine, job configuration, and the persisted job state.
//!
//! # Architecture
//!
//! Jobs flow through these states:
//! ```text
//! pending → running ⇄ paused
//!              ↓
//!   completed | completed_with_errors | cancelled | failed
//! ```
//!
//! `pending` and `paused` may also move straight to `cancelled` (or `failed`). The four
//! states on the last line are terminal.
//!
//! # Page-fetch retry
//!
//! Transient page-fetch failures are retried with exponential backoff before the
//! job is failed:
//! - Attempt 1: base delay (2 seconds)
//! - Attempt 2: 4 seconds
//! - Attempt 3: 8 seconds
//! - Capped at 30 seconds

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SyncStats;
use crate::error::AppError;

/// Smallest accepted batch size.
pub const MIN_BATCH_SIZE: u32 = 10;
/// Largest accepted batch size.
pub const MAX_BATCH_SIZE: u32 = 500;
/// Longest accepted pause between batches, in seconds.
pub const MAX_DELAY_SECS: u64 = 60;
/// Default cap on persisted error log entries. Oldest entries are dropped first.
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 500;

// =============================================================================
// Batch Status
// =============================================================================

/// Status of a batch sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Job accepted, first batch not started yet.
    Pending,
    /// Job is processing batches.
    Running,
    /// Job stopped at a batch boundary on request; resumable.
    Paused,
    /// All records processed without errors.
    Completed,
    /// All records processed, some images failed.
    CompletedWithErrors,
    /// Job was cancelled by the operator.
    Cancelled,
    /// The record source or the metadata store failed; job stopped.
    Failed,
}

impl BatchStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Paused => "paused",
            BatchStatus::Completed => "completed",
            BatchStatus::CompletedWithErrors => "completed_with_errors",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Failed => "failed",
        }
    }

    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed
                | BatchStatus::CompletedWithErrors
                | BatchStatus::Cancelled
                | BatchStatus::Failed
        )
    }

    /// Returns true if the job still occupies the single active slot.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        match (self, next) {
            (Pending, Running | Cancelled | Failed) => true,
            (Running, Paused | Completed | CompletedWithErrors | Cancelled | Failed) => true,
            (Paused, Running | Cancelled | Failed) => true,
            _ => false,
        }
    }

    /// Terminal status for a job that drained its source.
    pub fn finished(stats: &SyncStats) -> BatchStatus {
        if stats.has_errors() {
            BatchStatus::CompletedWithErrors
        } else {
            BatchStatus::Completed
        }
    }
}

/// Error type for parsing BatchStatus from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBatchStatusError(String);

impl std::fmt::Display for ParseBatchStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid batch status: {}", self.0)
    }
}

impl std::error::Error for ParseBatchStatusError {}

impl std::str::FromStr for BatchStatus {
    type Err = ParseBatchStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "running" => Ok(BatchStatus::Running),
            "paused" => Ok(BatchStatus::Paused),
            "completed" => Ok(BatchStatus::Completed),
            "completed_with_errors" => Ok(BatchStatus::CompletedWithErrors),
            "cancelled" => Ok(BatchStatus::Cancelled),
            "failed" => Ok(BatchStatus::Failed),
            _ => Err(ParseBatchStatusError(s.to_string())),
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Date Range
// =============================================================================

/// Optional inclusive date range applied to the source's modification time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Whether `date` falls inside the range (bounds inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(AppError::ValidationError(format!(
                "date_from ({}) must not be after date_to ({})",
                from, to
            ))),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Batch Configuration
// =============================================================================

/// Configuration snapshot of a batch job, fixed when the job is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Records per page.
    pub batch_size: u32,
    /// Pause between batches, in seconds.
    pub delay_between_batches: u64,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Simulate processing without download, upload or upsert.
    pub dry_run: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            delay_between_batches: 2,
            date_from: None,
            date_to: None,
            dry_run: false,
        }
    }
}

impl BatchConfig {
    /// Set the number of records per batch.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the delay between batches, in seconds.
    pub fn with_delay(mut self, secs: u64) -> Self {
        self.delay_between_batches = secs;
        self
    }

    /// Restrict the job to records modified inside the range.
    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    /// Enable dry-run mode.
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.date_from, self.date_to)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_between_batches)
    }

    /// Checks bounds on batch size and delay, and the date range ordering.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(AppError::ValidationError(format!(
                "batch_size must be between {} and {}, got {}",
                MIN_BATCH_SIZE, MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.delay_between_batches > MAX_DELAY_SECS {
            return Err(AppError::ValidationError(format!(
                "delay_between_batches must be between 0 and {} seconds, got {}",
                MAX_DELAY_SECS, self.delay_between_batches
            )));
        }
        self.date_range().validate()
    }
}

// =============================================================================
// Error Log
// =============================================================================

/// One entry of a job's error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub error: String,
    /// Set on the entry that ended the job.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fatal: bool,
    pub timestamp: DateTime<Utc>,
}

impl ErrorLogEntry {
    /// Entry for a failed image of a record.
    pub fn record(
        record_id: impl Into<String>,
        field: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            record_id: Some(record_id.into()),
            field: Some(field.into()),
            error: error.into(),
            fatal: false,
            timestamp: Utc::now(),
        }
    }

    /// Entry for the error that stopped a job or a run.
    pub fn fatal(error: impl Into<String>) -> Self {
        Self {
            record_id: None,
            field: None,
            error: error.into(),
            fatal: true,
            timestamp: Utc::now(),
        }
    }
}

/// Appends `entry`, dropping the oldest entries beyond `capacity`.
pub fn push_bounded(log: &mut Vec<ErrorLogEntry>, entry: ErrorLogEntry, capacity: usize) {
    log.push(entry);
    if log.len() > capacity {
        let excess = log.len() - capacity;
        log.drain(..excess);
    }
}

// =============================================================================
// Retry Configuration
// =============================================================================

/// Bounded exponential backoff for page fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// No retries: the first failure is final.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2_u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

// =============================================================================
// Batch Sync State
// =============================================================================

/// Persisted state of one batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSyncState {
    pub id: Uuid,
    pub status: BatchStatus,
    pub config: BatchConfig,

    /// Number of source records covered by completed batches.
    pub current_offset: u64,
    /// Record count reported by the source when the job started, if known.
    pub total_records_estimated: Option<u64>,
    pub batches_completed: u64,
    pub stats: SyncStats,
    pub error_log: Vec<ErrorLogEntry>,
    /// Error that moved the job to `failed`.
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_batch_started_at: Option<DateTime<Utc>>,
    pub last_batch_completed_at: Option<DateTime<Utc>>,
}

impl BatchSyncState {
    /// A fresh `pending` job for `config`.
    pub fn new(config: BatchConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: BatchStatus::Pending,
            config,
            current_offset: 0,
            total_records_estimated: None,
            batches_completed: 0,
            stats: SyncStats::default(),
            error_log: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            current_batch_started_at: None,
            last_batch_completed_at: None,
        }
    }

    /// Moves the job to `next`, stamping `completed_at` on terminal states.
    ///
    /// Returns `InvalidState` when the state machine forbids the move.
    pub fn transition(&mut self, next: BatchStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "batch job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        let now = Utc::now();
        if next == BatchStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
            self.current_batch_started_at = None;
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Records a fatal error and moves the job to `failed`.
    pub fn fail(&mut self, error: &AppError, capacity: usize) {
        let message = error.to_string();
        push_bounded(
            &mut self.error_log,
            ErrorLogEntry::fatal(message.clone()),
            capacity,
        );
        self.error_message = Some(message);
        if self.transition(BatchStatus::Failed).is_err() {
            // already terminal: keep the status, record the error only
            self.updated_at = Utc::now();
        }
    }

    /// Parks a job left active by a previous process.
    ///
    /// The last persisted checkpoint is authoritative, so the job can be resumed from
    /// `current_offset`. Terminal jobs are left untouched.
    pub fn suspend_after_restart(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = BatchStatus::Paused;
        self.current_batch_started_at = None;
        self.updated_at = Utc::now();
    }

    /// Progress as a percentage of the estimate, capped at 100.
    pub fn progress_percent(&self) -> Option<f64> {
        match self.total_records_estimated {
            Some(total) if total > 0 => {
                let pct = self.current_offset as f64 * 100.0 / total as f64;
                Some(pct.min(100.0))
            }
            _ => None,
        }
    }
}
