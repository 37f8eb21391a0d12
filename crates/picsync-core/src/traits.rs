//! Trait definitions for the engine's collaborators.
//!
//! The batch engine, the per-record pipeline and the sync run service only see these
//! traits, never the concrete record source, object store or database:
//!
//! - **Testability**: in-memory implementations drive the engine in tests
//! - **Decoupling**: core business logic doesn't depend on Zoho, Supabase or PostgreSQL
//!
//! # Example
//!
//! ```
//! use picsync_core::batch::DateRange;
//! use picsync_core::traits::{MetadataStore, RecordSource};
//!
//! // Counts images the catalog is missing for the first page of records.
//! async fn missing_on_first_page<R, M>(
//!     source: &R,
//!     store: &M,
//! ) -> Result<usize, picsync_core::AppError>
//! where
//!     R: RecordSource,
//!     M: MetadataStore,
//! {
//!     let mut missing = 0;
//!     for record in source.fetch_page(0, 50, &DateRange::default()).await? {
//!         for image in &record.images {
//!             if !store.image_exists(&record.id, &image.field_name).await? {
//!                 missing += 1;
//!             }
//!         }
//!     }
//!     Ok(missing)
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::batch::{BatchSyncState, DateRange};
use crate::models::{NewImage, SourceRecord, SyncRun, TransformOptions, TransformedImage};
use crate::AppError;

/// Pages through the external report.
///
/// Implementations handle their own authentication, rate limiting and transient
/// retries. An error returned from here means the source is unreachable.
pub trait RecordSource: Send + Sync + Clone {
    /// Fetches up to `limit` records starting at the 0-based `offset`.
    ///
    /// An empty page signals exhaustion.
    fn fetch_page(
        &self,
        offset: u64,
        limit: u32,
        range: &DateRange,
    ) -> impl Future<Output = Result<Vec<SourceRecord>, AppError>> + Send;

    /// Number of records in the range, or `None` when the source cannot tell.
    fn count(&self, range: &DateRange)
    -> impl Future<Output = Result<Option<u64>, AppError>> + Send;

    /// Fetches up to `limit` records added strictly before `before`, newest first.
    ///
    /// `None` fetches the newest records.
    fn fetch_before(
        &self,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<SourceRecord>, AppError>> + Send;

    /// Downloads the bytes behind an image field's URL.
    fn download_image(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;
}

/// Resizes and recompresses image bytes.
///
/// Pure and stateless; implementations must not perform I/O.
pub trait ImageTransform: Send + Sync + Clone {
    /// Transforms `bytes`, returning the input unchanged when no work is needed.
    fn transform(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        options: &TransformOptions,
    ) -> Result<TransformedImage, AppError>;
}

/// Durable blob storage for transformed images.
pub trait ObjectStore: Send + Sync + Clone {
    /// Uploads `bytes` to `path`, overwriting any previous object.
    ///
    /// # Returns
    ///
    /// The durable reference of the object, used to mint signed URLs later.
    fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Mints a time-limited retrieval URL for a stored object.
    fn signed_url(
        &self,
        path: &str,
        expires_in: Duration,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Relational store for image rows, sync runs and batch job state.
pub trait MetadataStore: Send + Sync + Clone {
    /// Whether an image row exists for `(record_id, field_name)`.
    fn image_exists(
        &self,
        record_id: &str,
        field_name: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Inserts or overwrites the image row keyed by `(zoho_record_id, field_name)`.
    fn upsert_image(&self, image: &NewImage) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Oldest source creation time among synced images.
    ///
    /// Used as the backfill cursor.
    fn oldest_synced_at(&self)
    -> impl Future<Output = Result<Option<DateTime<Utc>>, AppError>> + Send;

    /// Persists a job state row, inserting or replacing it by id.
    ///
    /// Must be atomic per call: this is the engine's checkpoint.
    fn save_batch_state(
        &self,
        state: &BatchSyncState,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_batch_state(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<BatchSyncState>, AppError>> + Send;

    /// Most recent jobs, newest first.
    fn list_batch_states(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<BatchSyncState>, AppError>> + Send;

    /// Jobs in `pending`, `running` or `paused`, newest first.
    fn list_active_batch_states(
        &self,
    ) -> impl Future<Output = Result<Vec<BatchSyncState>, AppError>> + Send;

    /// Persists a sync run row, inserting or replacing it by id.
    fn save_sync_run(&self, run: &SyncRun) -> impl Future<Output = Result<(), AppError>> + Send;
}
