//! Request DTOs for API endpoints.

use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use picsync_core::{BatchConfig, ImageFilter, SyncMode};

/// Maximum number of runs returned by `GET /runs`.
pub const MAX_RUNS_LIMIT: i64 = 100;

/// Request body for starting a batch job.
///
/// Omitted fields take the engine defaults.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartBatchRequest {
    /// Records per batch (10-500, default: 100)
    #[schema(example = 100)]
    pub batch_size: Option<u32>,

    /// Seconds to wait between batches (0-60, default: 2)
    #[schema(example = 2)]
    pub delay_between_batches: Option<u64>,

    /// Only records modified on or after this date
    #[schema(value_type = Option<String>, format = Date, example = "2024-01-01")]
    pub date_from: Option<NaiveDate>,

    /// Only records modified on or before this date
    #[schema(value_type = Option<String>, format = Date, example = "2024-06-30")]
    pub date_to: Option<NaiveDate>,

    /// Walk the report without downloading, uploading or writing rows
    #[serde(default)]
    pub dry_run: bool,
}

impl From<StartBatchRequest> for BatchConfig {
    fn from(req: StartBatchRequest) -> Self {
        let defaults = BatchConfig::default();
        BatchConfig {
            batch_size: req.batch_size.unwrap_or(defaults.batch_size),
            delay_between_batches: req
                .delay_between_batches
                .unwrap_or(defaults.delay_between_batches),
            date_from: req.date_from,
            date_to: req.date_to,
            dry_run: req.dry_run,
        }
    }
}

/// Request body for a quick or full sync run.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SyncRequest {
    /// "backfill" (default) or "full"
    #[serde(default)]
    #[schema(value_type = String, example = "backfill")]
    pub mode: SyncMode,

    /// Stop after this many records
    #[schema(example = 50)]
    pub max_records: Option<u32>,
}

/// Query parameters for listing sync runs.
#[derive(Debug, Deserialize, IntoParams)]
pub struct RunsQuery {
    /// Number of runs to return (default: 20, max: 100)
    #[param(example = 20)]
    pub limit: Option<i64>,
}

impl RunsQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, MAX_RUNS_LIMIT)
    }
}

/// Query parameters for the image catalog.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ImagesQuery {
    pub job_captain_timesheet: Option<String>,
    pub project_name: Option<String>,
    pub department: Option<String>,
    /// Case-insensitive match on the original filename
    pub search: Option<String>,
    /// Comma separated; images must carry every tag
    #[param(example = "exterior,before")]
    pub tags: Option<String>,
    pub category: Option<String>,
    /// Synced on or after this date
    #[param(value_type = Option<String>, format = Date)]
    pub date_from: Option<NaiveDate>,
    /// Synced on or before this date
    #[param(value_type = Option<String>, format = Date)]
    pub date_to: Option<NaiveDate>,
    /// Page size (1-500, default: 100)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<ImagesQuery> for ImageFilter {
    fn from(q: ImagesQuery) -> Self {
        let non_empty = |s: Option<String>| s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let tags = q
            .tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        ImageFilter {
            job_captain_timesheet: non_empty(q.job_captain_timesheet),
            project_name: non_empty(q.project_name),
            department: non_empty(q.department),
            search: non_empty(q.search),
            tags,
            category: non_empty(q.category),
            date_from: q.date_from,
            date_to: q.date_to,
            limit: q.limit.unwrap_or(ImageFilter::default().limit),
            offset: q.offset.unwrap_or(0),
        }
    }
}
