//! Domain models: source records, image rows, catalog queries, and sync runs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::SyncStats;
use crate::batch::{ErrorLogEntry, push_bounded};
use crate::error::AppError;

// =============================================================================
// Source records
// =============================================================================

/// One record of the external report, already normalized by the record source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Image fields found in the record, in field order.
    pub images: Vec<ImageField>,
    /// The raw record as returned by the source.
    pub fields: Map<String, Value>,
}

/// Id given to a source record that carries none.
pub const UNKNOWN_RECORD_ID: &str = "unknown";

impl SourceRecord {
    /// Whether the source supplied an id. Images of records without one cannot be
    /// keyed in the catalog.
    pub fn has_id(&self) -> bool {
        self.id != UNKNOWN_RECORD_ID
    }

    /// Reads a field as display text.
    ///
    /// Strings are returned as-is, numbers and booleans are stringified, and lookup
    /// objects use their `display_value`. Empty strings count as missing.
    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(value_as_text)
    }

    /// Collects tags from the given fields, accepting scalar and list values.
    pub fn tags(&self, tag_fields: &[String]) -> Vec<String> {
        let mut tags = Vec::new();
        for field in tag_fields {
            match self.fields.get(field) {
                Some(Value::Array(items)) => tags.extend(items.iter().filter_map(value_as_text)),
                Some(value) => tags.extend(value_as_text(value)),
                None => {}
            }
        }
        tags
    }

    /// The raw record as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(map) => map.get("display_value").and_then(value_as_text)?,
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// An image reference found in a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageField {
    /// Field name, suffixed with `_{index}` for list entries.
    pub field_name: String,
    pub download_url: String,
    pub filename: String,
}

// =============================================================================
// Image transform
// =============================================================================

/// Limits applied by the image transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    /// Inputs at or below this size are passed through.
    pub max_size_bytes: u64,
    pub max_dimension: u32,
    pub quality: u8,
}

/// Output of the image transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    /// True iff the bytes differ from the input.
    pub was_processed: bool,
}

// =============================================================================
// Images
// =============================================================================

/// Attributes written by the upsert, keyed by `(zoho_record_id, field_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewImage {
    pub zoho_record_id: String,
    pub field_name: String,
    pub storage_path: String,
    pub original_filename: String,
    pub file_size_bytes: i64,
    pub content_type: String,
    pub was_processed: bool,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub job_captain_timesheet: Option<String>,
    pub project_name: Option<String>,
    pub department: Option<String>,
    pub zoho_metadata: Value,
    pub zoho_created_at: Option<DateTime<Utc>>,
    pub zoho_modified_at: Option<DateTime<Utc>>,
}

/// A synced image row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub zoho_record_id: String,
    pub field_name: String,
    pub storage_path: String,
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
    pub zoho_metadata: Value,
    pub zoho_created_at: Option<DateTime<Utc>>,
    pub zoho_modified_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}

/// Largest page the catalog listing returns.
pub const MAX_IMAGE_PAGE: i64 = 500;

/// Filters for the catalog listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFilter {
    pub job_captain_timesheet: Option<String>,
    pub project_name: Option<String>,
    pub department: Option<String>,
    /// Case-insensitive substring of the original filename.
    pub search: Option<String>,
    /// Rows must carry every listed tag.
    pub tags: Vec<String>,
    pub category: Option<String>,
    /// Inclusive bounds on `synced_at`.
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self {
            job_captain_timesheet: None,
            project_name: None,
            department: None,
            search: None,
            tags: Vec::new(),
            category: None,
            date_from: None,
            date_to: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl ImageFilter {
    /// Checks paging bounds.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_IMAGE_PAGE).contains(&self.limit) {
            return Err(AppError::ValidationError(format!(
                "limit must be between 1 and {}",
                MAX_IMAGE_PAGE
            )));
        }
        if self.offset < 0 {
            return Err(AppError::ValidationError(
                "offset must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// One page of the catalog listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePage {
    pub items: Vec<Image>,
    pub total: i64,
}

/// Distinct values for the catalog's filter dropdowns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterValues {
    pub job_captains: Vec<String>,
    pub projects: Vec<String>,
    pub departments: Vec<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

/// Catalog-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStats {
    pub total_images: i64,
    pub processed_images: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Sync runs
// =============================================================================

/// How a sync run selects records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Every record of the report, newest images first skipped by existence check.
    Full,
    /// Records older than the oldest image already synced.
    #[default]
    Backfill,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Backfill => "backfill",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncMode::Full),
            "backfill" => Ok(SyncMode::Backfill),
            _ => Err(AppError::ValidationError(format!(
                "Unknown sync mode: '{}'. Valid options: full, backfill",
                s
            ))),
        }
    }
}

/// Status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "completed_with_errors" => Ok(RunStatus::CompletedWithErrors),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(AppError::Generic(format!("invalid run status: {}", s))),
        }
    }
}

/// One full or backfill sync invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub mode: SyncMode,
    pub status: RunStatus,
    pub max_records: Option<u32>,
    pub stats: SyncStats,
    pub error_log: Vec<ErrorLogEntry>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    /// A new `running` run.
    pub fn start(mode: SyncMode, max_records: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            status: RunStatus::Running,
            max_records,
            stats: SyncStats::default(),
            error_log: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Finalizes the run from its counters.
    pub fn complete(&mut self) {
        self.status = if self.stats.has_errors() {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };
        self.completed_at = Some(Utc::now());
    }

    /// Finalizes the run as failed with a fatal entry.
    pub fn fail(&mut self, error: &AppError, capacity: usize) {
        push_bounded(
            &mut self.error_log,
            ErrorLogEntry::fatal(error.to_string()),
            capacity,
        );
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }
}
