//! Job handlers.

use super::{CreateJobRequest, SearchQuery, parse_job_id};
use crate::api::AppState;
use crate::error::{Error, JobError};
use crate::job::JobInfo;
use crate::types::SearchHit;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

/// POST /jobs - Submit an archive URL
#[utoipa::path(
    post,
    path = "/jobs",
    tag = "jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job created and queued", body = JobInfo),
        (status = 400, description = "Invalid URL", body = crate::error::ApiError),
        (status = 503, description = "Manager not running or shutting down", body = crate::error::ApiError)
    )
)]
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobInfo>), Error> {
    let job = state.manager.create_job(&request.url).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /jobs - List all jobs, oldest first
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "All known jobs", body = Vec<JobInfo>)
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobInfo>> {
    Json(state.manager.list_jobs().await)
}

/// GET /jobs/:id - Get one job
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job snapshot", body = JobInfo),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobInfo>, Error> {
    let id = parse_job_id(&id)?;
    state
        .manager
        .get_job(&id)
        .await
        .map(Json)
        .ok_or(Error::Job(JobError::NotFound { id }))
}

/// POST /jobs/:id/retry - Re-queue a failed job
#[utoipa::path(
    post,
    path = "/jobs/{id}/retry",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job re-queued", body = JobInfo),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Job has not failed", body = crate::error::ApiError)
    )
)]
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobInfo>, Error> {
    let id = parse_job_id(&id)?;
    Ok(Json(state.manager.retry_job(&id).await?))
}

/// GET /jobs/:id/search - Full-text search in a completed job's index
#[utoipa::path(
    get,
    path = "/jobs/{id}/search",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID"),
        SearchQuery
    ),
    responses(
        (status = 200, description = "Ranked hits", body = Vec<SearchHit>),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Index not ready", body = crate::error::ApiError)
    )
)]
pub async fn search_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>, Error> {
    let id = parse_job_id(&id)?;
    Ok(Json(state.manager.search(&id, &query.q).await?))
}
