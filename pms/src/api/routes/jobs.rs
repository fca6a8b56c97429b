//! Job routes.
//!
//! - `POST /jobs` submits a job
//! - `GET /jobs` lists every job
//! - `GET /jobs/{id}` reports one job's status

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde_json::Value;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{JobListResponse, JobStatusResponse, SubmitJobResponse};
use crate::api::server::AppState;
use crate::error::Error;
use crate::pipeline::{Job, JobRequest};

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(submit_job))
        .route("/{id}", get(get_job_status))
}

/// Parse a submission body. `url` must be a non-blank string; `format` and
/// `quality` are optional strings.
pub(crate) fn parse_submission(body: &[u8]) -> ApiResult<JobRequest> {
    let value: Value = serde_json::from_slice(body).map_err(|_| ApiError::invalid_url())?;

    let url = value
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(ApiError::invalid_url)?;
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

    Ok(JobRequest {
        url: url.to_string(),
        format: text("format"),
        quality: text("quality"),
    })
}

/// Submit through the queue, mapping validation failures onto `INVALID_URL`.
pub(crate) async fn submit(state: &AppState, body: &[u8]) -> ApiResult<Job> {
    let request = parse_submission(body)?;
    state.job_queue.submit(request).await.map_err(|e| match e {
        Error::Validation(_) => ApiError::invalid_url(),
        other => other.into(),
    })
}

pub(crate) fn job_not_found() -> ApiError {
    ApiError::not_found("Job not found")
}

async fn submit_job(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    let job = submit(&state, &body).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse { job_id: job.id }),
    ))
}

async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    Json(JobListResponse {
        jobs: state.job_queue.list(),
    })
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.job_queue.get(&id).ok_or_else(job_not_found)?;
    Ok(Json(job.into()))
}

/// `GET /api/jobs`.
pub fn list_router() -> Router<AppState> {
    Router::new().route("/", get(list_jobs))
}
