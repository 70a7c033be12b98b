//! Job lifecycle routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/api/jobs` | Start a new dubbing job |
//! | GET | `/api/jobs` | List jobs with optional status filter |
//! | GET | `/api/jobs/{id}` | Get a job snapshot |
//! | POST | `/api/jobs/{id}/cancel` | Cancel a running job |
//! | POST | `/api/jobs/{id}/retry` | Retry failed segments of a failed job |
//! | DELETE | `/api/jobs/{id}` | Delete a terminal job |

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    ListJobsParams, ListJobsResponse, RetryJobRequest, RetryJobResponse, StartJobRequest,
    StartJobResponse,
};
use crate::api::server::AppState;
use crate::job::Job;
use crate::store::JobListFilter;

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_job).get(list_jobs))
        .route("/{id}", get(get_job).delete(delete_job))
        .route("/{id}/cancel", post(cancel_job))
        .route("/{id}/retry", post(retry_job))
}

#[utoipa::path(
    post,
    path = "/api/jobs",
    tag = "jobs",
    request_body = StartJobRequest,
    responses(
        (status = 202, description = "Job accepted", body = StartJobResponse),
        (status = 400, description = "Invalid input", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn start_job(
    State(state): State<AppState>,
    Json(payload): Json<StartJobRequest>,
) -> ApiResult<(StatusCode, Json<StartJobResponse>)> {
    let job = state
        .orchestrator
        .start_job(payload.source_url, payload.config)
        .await
        .map_err(ApiError::from)?;
    Ok((StatusCode::ACCEPTED, Json(StartJobResponse { job_id: job.id })))
}

#[utoipa::path(
    get,
    path = "/api/jobs",
    tag = "jobs",
    params(ListJobsParams),
    responses(
        (status = 200, description = "Job list", body = ListJobsResponse)
    )
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> ApiResult<Json<ListJobsResponse>> {
    let filter = JobListFilter {
        status: params.status,
        limit: params.limit.min(100) as usize,
        offset: params.offset as usize,
    };
    let (jobs, has_more) = state.store.list(filter).await.map_err(ApiError::from)?;
    Ok(Json(ListJobsResponse { jobs, has_more }))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    tag = "jobs",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job snapshot", body = Job),
        (status = 404, description = "Job not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state.store.get(&id).await.map_err(ApiError::from)?;
    Ok(Json(job))
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/cancel",
    tag = "jobs",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job cancelled"),
        (status = 404, description = "Job not found", body = crate::api::error::ApiErrorResponse),
        (status = 409, description = "Job is not cancellable", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<()>> {
    state.orchestrator.cancel_job(&id).await.map_err(ApiError::from)?;
    Ok(Json(()))
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/retry",
    tag = "jobs",
    params(("id" = String, Path, description = "Job ID")),
    request_body(content = RetryJobRequest, description = "Optional segment selection"),
    responses(
        (status = 200, description = "Retry started", body = RetryJobResponse),
        (status = 404, description = "Job not found", body = crate::api::error::ApiErrorResponse),
        (status = 409, description = "Job is not in a failed state", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<RetryJobRequest>>,
) -> ApiResult<Json<RetryJobResponse>> {
    let segment_indices = payload.and_then(|Json(p)| p.segment_indices);
    let retried = state
        .orchestrator
        .retry_job(&id, segment_indices)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(RetryJobResponse { retried }))
}

#[utoipa::path(
    delete,
    path = "/api/jobs/{id}",
    tag = "jobs",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job deleted"),
        (status = 404, description = "Job not found", body = crate::api::error::ApiErrorResponse),
        (status = 409, description = "Job is still running", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<()>> {
    state.orchestrator.delete_job(&id).await.map_err(ApiError::from)?;
    Ok(Json(()))
}
