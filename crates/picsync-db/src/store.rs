//! PostgreSQL implementation of [`MetadataStore`].

use chrono::{DateTime, Utc};
use picsync_core::batch::BatchSyncState;
use picsync_core::error::AppError;
use picsync_core::models::{NewImage, SyncRun};
use picsync_core::traits::MetadataStore;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{BatchStateRepository, ImageRepository, SyncRunRepository};

/// The three repositories behind one handle, as the engine and the run service see them.
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
    images: ImageRepository,
    runs: SyncRunRepository,
    batches: BatchStateRepository,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            images: ImageRepository::new(pool.clone()),
            runs: SyncRunRepository::new(pool.clone()),
            batches: BatchStateRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn images(&self) -> &ImageRepository {
        &self.images
    }

    pub fn runs(&self) -> &SyncRunRepository {
        &self.runs
    }

    pub fn batches(&self) -> &BatchStateRepository {
        &self.batches
    }

    /// Round-trips a trivial query.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl MetadataStore for PgMetadataStore {
    async fn image_exists(&self, record_id: &str, field_name: &str) -> Result<bool, AppError> {
        self.images.exists(record_id, field_name).await
    }

    async fn upsert_image(&self, image: &NewImage) -> Result<(), AppError> {
        let id = self.images.upsert(image).await?;
        tracing::trace!(%id, record_id = %image.zoho_record_id, field = %image.field_name, "Image row upserted");
        Ok(())
    }

    async fn oldest_synced_at(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        self.images.oldest_created_at().await
    }

    async fn save_batch_state(&self, state: &BatchSyncState) -> Result<(), AppError> {
        self.batches.save(state).await
    }

    async fn get_batch_state(&self, id: Uuid) -> Result<Option<BatchSyncState>, AppError> {
        self.batches.get(id).await
    }

    async fn list_batch_states(&self, limit: usize) -> Result<Vec<BatchSyncState>, AppError> {
        self.batches
            .list_recent(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
    }

    async fn list_active_batch_states(&self) -> Result<Vec<BatchSyncState>, AppError> {
        self.batches.list_active().await
    }

    async fn save_sync_run(&self, run: &SyncRun) -> Result<(), AppError> {
        self.runs.save(run).await
    }
}
