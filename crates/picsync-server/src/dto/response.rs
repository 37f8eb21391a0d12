//! Response DTOs for API endpoints.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use picsync_core::{
    BatchConfig, BatchOverview, BatchSyncState, ErrorLogEntry, FilterValues, Image, ImageStats,
    SyncRun, SyncStats,
};

// =============================================================================
// Health
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("healthy" or "degraded")
    pub status: String,
    /// Server version
    pub version: String,
    /// Database connectivity status
    pub database: ServiceStatus,
}

/// Status of an individual service component.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceStatus {
    /// Whether the service is reachable
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Plain acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// =============================================================================
// Shared pieces
// =============================================================================

/// Per-image counters of a job or run.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncStatsDto {
    pub records_processed: u64,
    pub images_synced: u64,
    pub images_skipped: u64,
    pub errors: u64,
}

impl From<SyncStats> for SyncStatsDto {
    fn from(s: SyncStats) -> Self {
        Self {
            records_processed: s.records_processed,
            images_synced: s.images_synced,
            images_skipped: s.images_skipped,
            errors: s.errors,
        }
    }
}

/// One error log entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEntryDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub error: String,
    /// Set on the entry that stopped the job or run
    pub fatal: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<ErrorLogEntry> for ErrorEntryDto {
    fn from(e: ErrorLogEntry) -> Self {
        Self {
            record_id: e.record_id,
            field: e.field,
            error: e.error,
            fatal: e.fatal,
            timestamp: e.timestamp,
        }
    }
}

// =============================================================================
// Batch jobs
// =============================================================================

/// Response to a batch start request.
#[derive(Debug, Serialize, ToSchema)]
pub struct StartBatchResponse {
    pub message: String,
    pub batch_id: Uuid,
}

/// Configuration snapshot of a batch job.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchConfigDto {
    pub batch_size: u32,
    pub delay_between_batches: u64,
    #[schema(value_type = Option<String>, format = Date)]
    pub date_from: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = Date)]
    pub date_to: Option<NaiveDate>,
    pub dry_run: bool,
}

impl From<BatchConfig> for BatchConfigDto {
    fn from(c: BatchConfig) -> Self {
        Self {
            batch_size: c.batch_size,
            delay_between_batches: c.delay_between_batches,
            date_from: c.date_from,
            date_to: c.date_to,
            dry_run: c.dry_run,
        }
    }
}

/// Full state of a batch job.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchJobResponse {
    pub id: Uuid,
    /// pending, running, paused, completed, completed_with_errors, cancelled or failed
    #[schema(example = "running")]
    pub status: String,
    pub config: BatchConfigDto,
    /// Records covered by completed batches
    pub current_offset: u64,
    pub total_records_estimated: Option<u64>,
    /// `current_offset / total_records_estimated`, capped at 100
    pub progress_percent: Option<f64>,
    pub batches_completed: u64,
    pub stats: SyncStatsDto,
    pub error_log: Vec<ErrorEntryDto>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_batch_started_at: Option<DateTime<Utc>>,
    pub last_batch_completed_at: Option<DateTime<Utc>>,
}

impl From<BatchSyncState> for BatchJobResponse {
    fn from(s: BatchSyncState) -> Self {
        let progress_percent = s.progress_percent();
        Self {
            id: s.id,
            status: s.status.to_string(),
            config: s.config.into(),
            current_offset: s.current_offset,
            total_records_estimated: s.total_records_estimated,
            progress_percent,
            batches_completed: s.batches_completed,
            stats: s.stats.into(),
            error_log: s.error_log.into_iter().map(ErrorEntryDto::from).collect(),
            error_message: s.error_message,
            created_at: s.created_at,
            updated_at: s.updated_at,
            started_at: s.started_at,
            completed_at: s.completed_at,
            current_batch_started_at: s.current_batch_started_at,
            last_batch_completed_at: s.last_batch_completed_at,
        }
    }
}

/// The active job and the most recent ones.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchOverviewResponse {
    pub active: Option<BatchJobResponse>,
    pub recent: Vec<BatchJobResponse>,
}

impl From<BatchOverview> for BatchOverviewResponse {
    fn from(o: BatchOverview) -> Self {
        Self {
            active: o.active.map(BatchJobResponse::from),
            recent: o.recent.into_iter().map(BatchJobResponse::from).collect(),
        }
    }
}

// =============================================================================
// Sync runs
// =============================================================================

/// Response to a sync run request.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncStartedResponse {
    pub message: String,
    pub run_id: Uuid,
}

/// One backfill or full run.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncRunResponse {
    pub id: Uuid,
    #[schema(example = "backfill")]
    pub mode: String,
    /// running, completed, completed_with_errors or failed
    #[schema(example = "completed")]
    pub status: String,
    pub max_records: Option<u32>,
    pub stats: SyncStatsDto,
    pub error_log: Vec<ErrorEntryDto>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<SyncRun> for SyncRunResponse {
    fn from(r: SyncRun) -> Self {
        Self {
            id: r.id,
            mode: r.mode.to_string(),
            status: r.status.to_string(),
            max_records: r.max_records,
            stats: r.stats.into(),
            error_log: r.error_log.into_iter().map(ErrorEntryDto::from).collect(),
            started_at: r.started_at,
            completed_at: r.completed_at,
        }
    }
}

/// Catalog counts.
#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogStatsDto {
    pub total_images: i64,
    pub processed_images: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<ImageStats> for CatalogStatsDto {
    fn from(s: ImageStats) -> Self {
        Self {
            total_images: s.total_images,
            processed_images: s.processed_images,
            last_synced_at: s.last_synced_at,
        }
    }
}

/// Sync status: whether a run is in flight, catalog counts and recent runs.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub is_running: bool,
    pub stats: CatalogStatsDto,
    pub recent_runs: Vec<SyncRunResponse>,
}

// =============================================================================
// Images
// =============================================================================

/// A synced image with a short-lived download URL.
#[derive(Debug, Serialize, ToSchema)]
pub struct ImageDto {
    pub id: Uuid,
    pub zoho_record_id: String,
    pub field_name: String,
    pub storage_path: String,
    /// Signed URL valid for one hour; absent when signing failed
    pub url: Option<String>,
    pub original_filename: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub content_type: Option<String>,
    pub was_processed: bool,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub job_captain_timesheet: Option<String>,
    pub project_name: Option<String>,
    pub department: Option<String>,
    /// Source record as fetched
    #[schema(value_type = Object)]
    pub zoho_metadata: serde_json::Value,
    pub zoho_created_at: Option<DateTime<Utc>>,
    pub zoho_modified_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}

impl ImageDto {
    pub fn new(image: Image, url: Option<String>) -> Self {
        Self {
            id: image.id,
            zoho_record_id: image.zoho_record_id,
            field_name: image.field_name,
            storage_path: image.storage_path,
            url,
            original_filename: image.original_filename,
            file_size_bytes: image.file_size_bytes,
            content_type: image.content_type,
            was_processed: image.was_processed,
            tags: image.tags,
            category: image.category,
            description: image.description,
            job_captain_timesheet: image.job_captain_timesheet,
            project_name: image.project_name,
            department: image.department,
            zoho_metadata: image.zoho_metadata,
            zoho_created_at: image.zoho_created_at,
            zoho_modified_at: image.zoho_modified_at,
            synced_at: image.synced_at,
        }
    }
}

/// One page of the image catalog.
#[derive(Debug, Serialize, ToSchema)]
pub struct ImagePageResponse {
    pub items: Vec<ImageDto>,
    /// Matching rows across all pages
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Distinct values for the catalog filters.
#[derive(Debug, Serialize, ToSchema)]
pub struct FilterValuesResponse {
    pub job_captains: Vec<String>,
    pub projects: Vec<String>,
    pub departments: Vec<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

impl From<FilterValues> for FilterValuesResponse {
    fn from(v: FilterValues) -> Self {
        Self {
            job_captains: v.job_captains,
            projects: v.projects,
            departments: v.departments,
            categories: v.categories,
            tags: v.tags,
        }
    }
}
