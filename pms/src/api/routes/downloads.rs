//! Download routes under `/api/download`.
//!
//! Same operations as the job routes with the field names web clients use.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::info;

use super::jobs::{job_not_found, submit};
use crate::api::error::ApiResult;
use crate::api::models::{DownloadAcceptedResponse, JobStatusResponse};
use crate::api::server::AppState;

/// Create the downloads router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_download))
        .route("/{id}/status", get(get_download_status))
}

async fn create_download(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<DownloadAcceptedResponse>)> {
    let job = submit(&state, &body).await?;
    info!(job_id = %job.id, url = %job.source.url, "Download job accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(DownloadAcceptedResponse {
            download_id: job.id,
        }),
    ))
}

async fn get_download_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.job_queue.get(&id).ok_or_else(job_not_found)?;
    Ok(Json(job.into()))
}
