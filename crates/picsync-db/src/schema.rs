//! Database schema.
//!
//! Statements are idempotent and run in order at startup.

use picsync_core::error::AppError;
use sqlx::PgPool;

/// Schema statements. Each statement must be executed separately due to sqlx limitations.
pub const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS images (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        zoho_record_id VARCHAR NOT NULL,
        field_name VARCHAR NOT NULL,
        storage_path TEXT NOT NULL,
        original_filename TEXT,
        file_size_bytes BIGINT,
        content_type VARCHAR,
        was_processed BOOLEAN NOT NULL DEFAULT FALSE,
        tags TEXT[] NOT NULL DEFAULT '{}',
        category TEXT,
        description TEXT,
        job_captain_timesheet TEXT,
        project_name TEXT,
        department TEXT,
        zoho_metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        zoho_created_at TIMESTAMPTZ,
        zoho_modified_at TIMESTAMPTZ,
        synced_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT uk_images_record_field UNIQUE (zoho_record_id, field_name)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_images_synced_at ON images(synced_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_images_zoho_created_at ON images(zoho_created_at)",
    "CREATE INDEX IF NOT EXISTS idx_images_tags ON images USING gin (tags)",
    r#"CREATE TABLE IF NOT EXISTS sync_runs (
        id UUID PRIMARY KEY,
        mode VARCHAR NOT NULL,
        status VARCHAR NOT NULL,
        max_records INTEGER,
        records_processed BIGINT NOT NULL DEFAULT 0,
        images_synced BIGINT NOT NULL DEFAULT 0,
        images_skipped BIGINT NOT NULL DEFAULT 0,
        errors BIGINT NOT NULL DEFAULT 0,
        error_log JSONB NOT NULL DEFAULT '[]'::jsonb,
        started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        completed_at TIMESTAMPTZ
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_sync_runs_started_at ON sync_runs(started_at DESC)",
    r#"CREATE TABLE IF NOT EXISTS batch_sync_state (
        id UUID PRIMARY KEY,
        status VARCHAR NOT NULL,
        batch_size INTEGER NOT NULL,
        delay_between_batches INTEGER NOT NULL,
        date_from DATE,
        date_to DATE,
        dry_run BOOLEAN NOT NULL DEFAULT FALSE,
        current_offset BIGINT NOT NULL DEFAULT 0,
        total_records_estimated BIGINT,
        batches_completed BIGINT NOT NULL DEFAULT 0,
        records_processed BIGINT NOT NULL DEFAULT 0,
        images_synced BIGINT NOT NULL DEFAULT 0,
        images_skipped BIGINT NOT NULL DEFAULT 0,
        errors BIGINT NOT NULL DEFAULT 0,
        error_log JSONB NOT NULL DEFAULT '[]'::jsonb,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ,
        current_batch_started_at TIMESTAMPTZ,
        last_batch_completed_at TIMESTAMPTZ
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_batch_sync_state_created_at ON batch_sync_state(created_at DESC)",
    r#"UPDATE batch_sync_state
        SET status = 'failed',
            error_message = 'superseded by a newer active batch job',
            completed_at = NOW(),
            updated_at = NOW()
        WHERE status IN ('pending', 'running', 'paused')
          AND id <> (
              SELECT id FROM batch_sync_state
              WHERE status IN ('pending', 'running', 'paused')
              ORDER BY created_at DESC
              LIMIT 1
          )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS uk_batch_sync_state_single_active
        ON batch_sync_state ((true))
        WHERE status IN ('pending', 'running', 'paused')"#,
];

/// Index allowing at most one `pending`, `running` or `paused` job.
pub const SINGLE_ACTIVE_INDEX: &str = "uk_batch_sync_state_single_active";

/// Applies [`MIGRATIONS`] in order.
pub async fn migrate(pool: &PgPool) -> Result<(), AppError> {
    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!(statements = MIGRATIONS.len(), "Database schema up to date");
    Ok(())
}
