//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::dto::{
    BatchConfigDto, BatchJobResponse, BatchOverviewResponse, CatalogStatsDto, ErrorEntryDto,
    FilterValuesResponse, HealthResponse, ImageDto, ImagePageResponse, MessageResponse,
    ServiceStatus, StartBatchRequest, StartBatchResponse, StatusResponse, SyncRequest,
    SyncRunResponse, SyncStartedResponse, SyncStatsDto,
};
use crate::error::ErrorResponse;
use crate::handlers::{batch, health, images, sync};

/// OpenAPI documentation for the picsync API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "picsync API",
        version = "1.0.0",
        description = "Copies photos attached to Zoho Creator records into Supabase Storage
and catalogs them in PostgreSQL.

## Batch jobs

Long syncs run as resumable batch jobs: start one, watch its progress, and pause,
resume or cancel it. Progress is checkpointed after every batch.

## Quick Start

1. Check server health: `GET /api/v1/health`
2. Start a batch job: `POST /api/v1/sync/batch` with `{\"batch_size\": 100}`
3. Poll it: `GET /api/v1/sync/batch`
4. Browse the catalog: `GET /api/v1/images`
",
        license(
            name = "Apache-2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        health::health_check,
        batch::start_batch,
        batch::batch_overview,
        batch::get_batch,
        batch::pause_batch,
        batch::resume_batch,
        batch::cancel_batch,
        sync::trigger_sync,
        sync::get_status,
        sync::list_runs,
        images::list_images,
        images::get_filters,
    ),
    components(
        schemas(
            // Request types
            StartBatchRequest,
            SyncRequest,
            // Response types
            ErrorResponse,
            HealthResponse,
            ServiceStatus,
            MessageResponse,
            StartBatchResponse,
            BatchConfigDto,
            BatchJobResponse,
            BatchOverviewResponse,
            SyncStatsDto,
            ErrorEntryDto,
            SyncStartedResponse,
            SyncRunResponse,
            CatalogStatsDto,
            StatusResponse,
            ImageDto,
            ImagePageResponse,
            FilterValuesResponse,
        )
    ),
    tags(
        (name = "system", description = "System health"),
        (name = "batch", description = "Resumable batch sync jobs"),
        (name = "sync", description = "Backfill and full sync runs"),
        (name = "images", description = "Synced image catalog"),
    )
)]
pub struct ApiDoc;
