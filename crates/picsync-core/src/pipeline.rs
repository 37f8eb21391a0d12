//! The per-record pipeline shared by batch jobs and sync runs.
//!
//! For every image field of a record:
//! ```text
//! exists? ──yes──▶ skipped
//!    │ no
//! dry run? ──yes──▶ synced (no side effects)
//!    │ no
//! download ─▶ transform ─▶ upload ─▶ upsert ─▶ synced
//! ```
//! Any failure after the existence check is isolated to that image: it is
//! returned as a failure and the remaining images of the record still run.
//! Images of a record without an id fail before the existence check.

use url::Url;

use crate::SyncStats;
use crate::batch::{ErrorLogEntry, push_bounded};
use crate::config::FieldMapping;
use crate::error::AppError;
use crate::models::{ImageField, NewImage, SourceRecord, TransformOptions};
use crate::sync::ImageOutcome;
use crate::traits::{ImageTransform, MetadataStore, ObjectStore, RecordSource};

/// Content type used when the extension is unknown.
pub const FALLBACK_CONTENT_TYPE: &str = "image/webp";

/// One failed image of a record.
#[derive(Debug)]
pub struct ImageFailure {
    pub field: String,
    pub error: AppError,
}

/// Everything that happened to one record.
#[derive(Debug)]
pub struct RecordResult {
    pub record_id: String,
    pub outcomes: Vec<ImageOutcome>,
    pub failures: Vec<ImageFailure>,
}

impl RecordResult {
    /// Folds the result into job counters and the bounded error log.
    pub fn tally(&self, stats: &mut SyncStats, error_log: &mut Vec<ErrorLogEntry>, capacity: usize) {
        stats.record_seen();
        for outcome in &self.outcomes {
            stats.record(*outcome);
        }
        for failure in &self.failures {
            push_bounded(
                error_log,
                ErrorLogEntry::record(&self.record_id, &failure.field, failure_message(&failure.error)),
                capacity,
            );
        }
    }
}

fn failure_message(error: &AppError) -> String {
    match error {
        AppError::RecordProcessing { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Runs records through existence check, transform, upload and upsert.
#[derive(Clone)]
pub struct RecordPipeline<R, T, O, M>
where
    R: RecordSource,
    T: ImageTransform,
    O: ObjectStore,
    M: MetadataStore,
{
    source: R,
    transform: T,
    objects: O,
    metadata: M,
    fields: FieldMapping,
    options: TransformOptions,
}

impl<R, T, O, M> RecordPipeline<R, T, O, M>
where
    R: RecordSource,
    T: ImageTransform + 'static,
    O: ObjectStore,
    M: MetadataStore,
{
    pub fn new(
        source: R,
        transform: T,
        objects: O,
        metadata: M,
        fields: FieldMapping,
        options: TransformOptions,
    ) -> Self {
        Self {
            source,
            transform,
            objects,
            metadata,
            fields,
            options,
        }
    }

    pub fn source(&self) -> &R {
        &self.source
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Processes every image field of `record`, in field order.
    ///
    /// Never fails: per-image errors are collected in the result.
    pub async fn process_record(&self, record: &SourceRecord, dry_run: bool) -> RecordResult {
        let mut result = RecordResult {
            record_id: record.id.clone(),
            outcomes: Vec::with_capacity(record.images.len()),
            failures: Vec::new(),
        };

        for image in &record.images {
            match self.process_image(record, image, dry_run).await {
                Ok(outcome) => result.outcomes.push(outcome),
                Err(error) => {
                    result.outcomes.push(ImageOutcome::Failed);
                    result.failures.push(ImageFailure {
                        field: image.field_name.clone(),
                        error: AppError::RecordProcessing {
                            record_id: record.id.clone(),
                            field: image.field_name.clone(),
                            message: error.to_string(),
                        },
                    });
                }
            }
        }

        result
    }

    async fn process_image(
        &self,
        record: &SourceRecord,
        image: &ImageField,
        dry_run: bool,
    ) -> Result<ImageOutcome, AppError> {
        if !record.has_id() {
            return Err(AppError::ValidationError(
                "record has no ID, image cannot be keyed".to_string(),
            ));
        }
        if self
            .metadata
            .image_exists(&record.id, &image.field_name)
            .await?
        {
            return Ok(ImageOutcome::Skipped);
        }
        if dry_run {
            return Ok(ImageOutcome::Synced);
        }

        validate_download_url(&image.download_url)?;
        let raw = self.source.download_image(&image.download_url).await?;

        let transform = self.transform.clone();
        let filename = image.filename.clone();
        let options = self.options;
        let transformed =
            tokio::task::spawn_blocking(move || transform.transform(raw, &filename, &options))
                .await
                .map_err(|e| AppError::ImageError(format!("transform task failed: {}", e)))??;

        let category = self.field_text(record, self.fields.category_field.as_deref());
        let path = storage_path(
            category.as_deref(),
            record.created_at,
            &record.id,
            &transformed.filename,
        );
        let content_type = guess_content_type(&transformed.filename);
        let file_size_bytes = transformed.bytes.len() as i64;

        let storage_ref = self
            .objects
            .upload(&path, transformed.bytes, content_type)
            .await?;

        let row = NewImage {
            zoho_record_id: record.id.clone(),
            field_name: image.field_name.clone(),
            storage_path: storage_ref,
            original_filename: image.filename.clone(),
            file_size_bytes,
            content_type: content_type.to_string(),
            was_processed: transformed.was_processed,
            tags: record.tags(&self.fields.tag_fields),
            category,
            description: self.field_text(record, self.fields.description_field.as_deref()),
            job_captain_timesheet: self.field_text(record, self.fields.job_captain_field.as_deref()),
            project_name: self.field_text(record, self.fields.project_field.as_deref()),
            department: self.field_text(record, self.fields.department_field.as_deref()),
            zoho_metadata: record.to_json(),
            zoho_created_at: record.created_at,
            zoho_modified_at: record.modified_at,
        };
        self.metadata.upsert_image(&row).await?;

        Ok(ImageOutcome::Synced)
    }

    fn field_text(&self, record: &SourceRecord, field: Option<&str>) -> Option<String> {
        field.and_then(|f| record.text(f))
    }
}

/// Rejects URLs that cannot be downloaded over HTTP.
pub fn validate_download_url(raw: &str) -> Result<(), AppError> {
    let parsed = Url::parse(raw).map_err(|_| AppError::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(AppError::InvalidUrl(raw.to_string())),
    }
}

/// Object path of an image: `{category}/{YYYY-MM}/{record_id}_{filename}`.
///
/// Missing categories become `uncategorized`, missing dates `unknown`.
pub fn storage_path(
    category: Option<&str>,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
    record_id: &str,
    filename: &str,
) -> String {
    let folder = category
        .map(|c| c.trim().replace(['/', '\\'], "_"))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "uncategorized".to_string());
    let month = created_at
        .map(|t| t.format("%Y-%m").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}/{}/{}_{}", folder, month, record_id, filename)
}

/// Content type from the filename extension.
pub fn guess_content_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => FALLBACK_CONTENT_TYPE,
    }
}
