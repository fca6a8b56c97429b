//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::library::Track;
use crate::pipeline::{Job, JobStats, JobStatus};

/// Response to `POST /jobs`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: String,
}

/// Response to `POST /api/download`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAcceptedResponse {
    pub download_id: String,
}

/// Status view of a single job.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub error: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            error: job.error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Seconds since the server started.
    pub uptime: u64,
    pub version: String,
    pub jobs: JobStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackListResponse {
    pub tracks: Vec<Track>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}
