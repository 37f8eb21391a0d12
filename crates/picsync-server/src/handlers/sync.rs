//! Quick and full sync run endpoints.

use axum::{Json, extract::State, http::StatusCode};

use crate::dto::{RunsQuery, StatusResponse, SyncRequest, SyncRunResponse, SyncStartedResponse};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

/// Recent runs shown by `GET /status`.
const STATUS_RECENT_RUNS: i64 = 10;

/// Trigger a backfill or full sync run.
///
/// Returns as soon as the run row exists; the run continues in the background.
#[utoipa::path(
    post,
    path = "/api/v1/sync",
    request_body = SyncRequest,
    responses(
        (status = 202, description = "Sync run started", body = SyncStartedResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "A sync run is already in progress"),
    ),
    tag = "sync"
)]
pub async fn trigger_sync(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SyncRequest>,
) -> Result<(StatusCode, Json<SyncStartedResponse>), ApiError> {
    let started = state.runs.begin(request.mode, request.max_records).await?;
    let run_id = started.id();

    let runs = state.runs.clone();
    tokio::spawn(async move {
        if let Err(e) = runs.execute(started).await {
            tracing::error!(run_id = %run_id, error = %e, "Failed to finalize sync run");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncStartedResponse {
            message: format!("{} sync started", request.mode),
            run_id,
        }),
    ))
}

/// Whether a run is in flight, catalog counts and the latest runs.
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Sync status", body = StatusResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "sync"
)]
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let stats = state.store.images().stats().await?;
    let recent_runs = state.store.runs().list_recent(STATUS_RECENT_RUNS).await?;

    Ok(Json(StatusResponse {
        is_running: state.runs.is_running(),
        stats: stats.into(),
        recent_runs: recent_runs.into_iter().map(SyncRunResponse::from).collect(),
    }))
}

/// Recent sync runs, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/runs",
    params(RunsQuery),
    responses(
        (status = 200, description = "Recent runs", body = Vec<SyncRunResponse>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "sync"
)]
pub async fn list_runs(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RunsQuery>,
) -> Result<Json<Vec<SyncRunResponse>>, ApiError> {
    let runs = state.store.runs().list_recent(query.limit()).await?;
    Ok(Json(runs.into_iter().map(SyncRunResponse::from).collect()))
}
