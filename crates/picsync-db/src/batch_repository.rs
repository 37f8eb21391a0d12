//! Batch job state persistence.
//!
//! Every engine checkpoint is a single upsert of the whole row, so a crash
//! between two checkpoints leaves the previous one intact.

use chrono::{DateTime, NaiveDate, Utc};
use picsync_core::batch::{BatchConfig, BatchStatus, BatchSyncState, ErrorLogEntry};
use picsync_core::error::AppError;
use picsync_core::sync::SyncStats;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use crate::schema::SINGLE_ACTIVE_INDEX;

/// Repository for `batch_sync_state` rows.
#[derive(Clone)]
pub struct BatchStateRepository {
    pool: Pool<Postgres>,
}

// =============================================================================
// Helper Types for Database Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct BatchStateRow {
    id: Uuid,
    status: String,
    batch_size: i32,
    delay_between_batches: i32,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    dry_run: bool,
    current_offset: i64,
    total_records_estimated: Option<i64>,
    batches_completed: i64,
    records_processed: i64,
    images_synced: i64,
    images_skipped: i64,
    errors: i64,
    error_log: Json<Vec<ErrorLogEntry>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    current_batch_started_at: Option<DateTime<Utc>>,
    last_batch_completed_at: Option<DateTime<Utc>>,
}

fn unsigned(n: i64) -> u64 {
    n.max(0) as u64
}

impl TryFrom<BatchStateRow> for BatchSyncState {
    type Error = AppError;

    fn try_from(row: BatchStateRow) -> Result<Self, Self::Error> {
        let status: BatchStatus = row
            .status
            .parse()
            .map_err(|e: picsync_core::batch::ParseBatchStatusError| {
                AppError::Generic(e.to_string())
            })?;

        Ok(Self {
            id: row.id,
            status,
            config: BatchConfig {
                batch_size: row.batch_size.max(0) as u32,
                delay_between_batches: row.delay_between_batches.max(0) as u64,
                date_from: row.date_from,
                date_to: row.date_to,
                dry_run: row.dry_run,
            },
            current_offset: unsigned(row.current_offset),
            total_records_estimated: row.total_records_estimated.map(unsigned),
            batches_completed: unsigned(row.batches_completed),
            stats: SyncStats {
                records_processed: unsigned(row.records_processed),
                images_synced: unsigned(row.images_synced),
                images_skipped: unsigned(row.images_skipped),
                errors: unsigned(row.errors),
            },
            error_log: row.error_log.0,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            current_batch_started_at: row.current_batch_started_at,
            last_batch_completed_at: row.last_batch_completed_at,
        })
    }
}

// =============================================================================
// Queries
// =============================================================================

impl BatchStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the job or replaces every column but its id and creation time.
    ///
    /// Fails with `Conflict` if the row would become a second active job.
    pub async fn save(&self, state: &BatchSyncState) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO batch_sync_state (
                id, status, batch_size, delay_between_batches, date_from, date_to, dry_run,
                current_offset, total_records_estimated, batches_completed,
                records_processed, images_synced, images_skipped, errors,
                error_log, error_message,
                created_at, updated_at, started_at, completed_at,
                current_batch_started_at, last_batch_completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                current_offset = EXCLUDED.current_offset,
                total_records_estimated = EXCLUDED.total_records_estimated,
                batches_completed = EXCLUDED.batches_completed,
                records_processed = EXCLUDED.records_processed,
                images_synced = EXCLUDED.images_synced,
                images_skipped = EXCLUDED.images_skipped,
                errors = EXCLUDED.errors,
                error_log = EXCLUDED.error_log,
                error_message = EXCLUDED.error_message,
                updated_at = EXCLUDED.updated_at,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at,
                current_batch_started_at = EXCLUDED.current_batch_started_at,
                last_batch_completed_at = EXCLUDED.last_batch_completed_at
            "#,
        )
        .bind(state.id)
        .bind(state.status.as_str())
        .bind(state.config.batch_size as i32)
        .bind(state.config.delay_between_batches as i32)
        .bind(state.config.date_from)
        .bind(state.config.date_to)
        .bind(state.config.dry_run)
        .bind(state.current_offset as i64)
        .bind(state.total_records_estimated.map(|n| n as i64))
        .bind(state.batches_completed as i64)
        .bind(state.stats.records_processed as i64)
        .bind(state.stats.images_synced as i64)
        .bind(state.stats.images_skipped as i64)
        .bind(state.stats.errors as i64)
        .bind(Json(&state.error_log))
        .bind(&state.error_message)
        .bind(state.created_at)
        .bind(state.updated_at)
        .bind(state.started_at)
        .bind(state.completed_at)
        .bind(state.current_batch_started_at)
        .bind(state.last_batch_completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let second_active = matches!(
                &e,
                sqlx::Error::Database(db) if db.constraint() == Some(SINGLE_ACTIVE_INDEX)
            );
            if second_active {
                AppError::Conflict(format!(
                    "batch job {} cannot be {}: another job is already active",
                    state.id, state.status
                ))
            } else {
                AppError::from(e)
            }
        })?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<BatchSyncState>, AppError> {
        let row: Option<BatchStateRow> =
            sqlx::query_as("SELECT * FROM batch_sync_state WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(BatchSyncState::try_from).transpose()
    }

    /// Most recent jobs, newest first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<BatchSyncState>, AppError> {
        let rows: Vec<BatchStateRow> =
            sqlx::query_as("SELECT * FROM batch_sync_state ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(BatchSyncState::try_from).collect()
    }

    /// Jobs that are pending, running or paused, newest first.
    pub async fn list_active(&self) -> Result<Vec<BatchSyncState>, AppError> {
        let rows: Vec<BatchStateRow> = sqlx::query_as(
            r#"
            SELECT * FROM batch_sync_state
            WHERE status IN ('pending', 'running', 'paused')
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BatchSyncState::try_from).collect()
    }
}
