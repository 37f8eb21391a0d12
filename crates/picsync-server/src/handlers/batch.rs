//! Batch job control endpoints.

use axum::{Json, extract::State};
use uuid::Uuid;

use crate::dto::{
    BatchJobResponse, BatchOverviewResponse, MessageResponse, StartBatchRequest,
    StartBatchResponse,
};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::state::AppState;

/// Start a batch job.
///
/// The job runs in the background; poll `GET /api/v1/sync/batch/{id}` for progress.
#[utoipa::path(
    post,
    path = "/api/v1/sync/batch",
    request_body = StartBatchRequest,
    responses(
        (status = 200, description = "Batch job started", body = StartBatchResponse),
        (status = 400, description = "Invalid batch configuration"),
        (status = 409, description = "A batch job is already active"),
    ),
    tag = "batch"
)]
pub async fn start_batch(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<StartBatchRequest>,
) -> Result<Json<StartBatchResponse>, ApiError> {
    let batch_id = state.engine.start(request.into()).await?;

    Ok(Json(StartBatchResponse {
        message: "Batch sync started".to_string(),
        batch_id,
    }))
}

/// Active batch job and recent history.
#[utoipa::path(
    get,
    path = "/api/v1/sync/batch",
    responses(
        (status = 200, description = "Batch overview", body = BatchOverviewResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "batch"
)]
pub async fn batch_overview(
    State(state): State<AppState>,
) -> Result<Json<BatchOverviewResponse>, ApiError> {
    let overview = state.engine.overview().await?;
    Ok(Json(overview.into()))
}

/// Full state of one batch job.
#[utoipa::path(
    get,
    path = "/api/v1/sync/batch/{id}",
    params(
        ("id" = Uuid, Path, description = "Batch job UUID")
    ),
    responses(
        (status = 200, description = "Batch job state", body = BatchJobResponse),
        (status = 404, description = "Batch job not found"),
    ),
    tag = "batch"
)]
pub async fn get_batch(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let job = state.engine.status(id).await?;
    Ok(Json(job.into()))
}

/// Pause a running batch job at the next batch boundary.
#[utoipa::path(
    post,
    path = "/api/v1/sync/batch/{id}/pause",
    params(
        ("id" = Uuid, Path, description = "Batch job UUID")
    ),
    responses(
        (status = 200, description = "Pause requested", body = MessageResponse),
        (status = 404, description = "Batch job not found"),
        (status = 409, description = "Job is not running"),
    ),
    tag = "batch"
)]
pub async fn pause_batch(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.engine.pause(id).await?;
    Ok(Json(MessageResponse::new("Batch sync pause requested")))
}

/// Resume a paused batch job from its checkpoint.
#[utoipa::path(
    post,
    path = "/api/v1/sync/batch/{id}/resume",
    params(
        ("id" = Uuid, Path, description = "Batch job UUID")
    ),
    responses(
        (status = 200, description = "Job resumed", body = MessageResponse),
        (status = 404, description = "Batch job not found"),
        (status = 409, description = "Job is not paused, or another job is active"),
    ),
    tag = "batch"
)]
pub async fn resume_batch(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.engine.resume(id).await?;
    Ok(Json(MessageResponse::new("Batch sync resumed")))
}

/// Cancel a pending, running or paused batch job.
#[utoipa::path(
    post,
    path = "/api/v1/sync/batch/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Batch job UUID")
    ),
    responses(
        (status = 200, description = "Cancel requested", body = MessageResponse),
        (status = 404, description = "Batch job not found"),
        (status = 409, description = "Job already finished"),
    ),
    tag = "batch"
)]
pub async fn cancel_batch(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.engine.cancel(id).await?;
    Ok(Json(MessageResponse::new("Batch sync cancel requested")))
}
