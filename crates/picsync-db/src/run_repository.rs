//! Sync run history.

use chrono::{DateTime, Utc};
use picsync_core::batch::ErrorLogEntry;
use picsync_core::error::AppError;
use picsync_core::models::SyncRun;
use picsync_core::sync::SyncStats;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Repository for `sync_runs` rows.
#[derive(Clone)]
pub struct SyncRunRepository {
    pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct SyncRunRow {
    id: Uuid,
    mode: String,
    status: String,
    max_records: Option<i32>,
    records_processed: i64,
    images_synced: i64,
    images_skipped: i64,
    errors: i64,
    error_log: Json<Vec<ErrorLogEntry>>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SyncRunRow> for SyncRun {
    type Error = AppError;

    fn try_from(row: SyncRunRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            mode: row.mode.parse()?,
            status: row.status.parse()?,
            max_records: row.max_records.map(|n| n.max(0) as u32),
            stats: SyncStats {
                records_processed: row.records_processed.max(0) as u64,
                images_synced: row.images_synced.max(0) as u64,
                images_skipped: row.images_skipped.max(0) as u64,
                errors: row.errors.max(0) as u64,
            },
            error_log: row.error_log.0,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

impl SyncRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the run or overwrites its mutable columns.
    pub async fn save(&self, run: &SyncRun) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, mode, status, max_records,
                records_processed, images_synced, images_skipped, errors,
                error_log, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                records_processed = EXCLUDED.records_processed,
                images_synced = EXCLUDED.images_synced,
                images_skipped = EXCLUDED.images_skipped,
                errors = EXCLUDED.errors,
                error_log = EXCLUDED.error_log,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(run.id)
        .bind(run.mode.as_str())
        .bind(run.status.as_str())
        .bind(run.max_records.map(|n| n.min(i32::MAX as u32) as i32))
        .bind(run.stats.records_processed as i64)
        .bind(run.stats.images_synced as i64)
        .bind(run.stats.images_skipped as i64)
        .bind(run.stats.errors as i64)
        .bind(Json(&run.error_log))
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<SyncRun>, AppError> {
        let row: Option<SyncRunRow> = sqlx::query_as("SELECT * FROM sync_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SyncRun::try_from).transpose()
    }

    /// Most recent runs, newest first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<SyncRun>, AppError> {
        let rows: Vec<SyncRunRow> =
            sqlx::query_as("SELECT * FROM sync_runs ORDER BY started_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(SyncRun::try_from).collect()
    }
}
