//! Per-job pipeline: acquire, normalize, probe, commit.
//!
//! Stages run strictly in order inside a job-scoped working directory. The
//! first failure aborts the rest and the working directory is removed before
//! the error is returned. On success the directory is kept, since it holds
//! the file the committed track points at.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::job_queue::{Job, JobResult};
use super::platform::detect_platform;
use super::processors::{
    AcquireRequest, Acquirer, FfmpegNormalizer, FfprobeProber, JobProcessor, NormalizeOptions,
    Normalizer, Prober, YtDlpAcquirer,
};
use crate::config::AppConfig;
use crate::library::{Artwork, Track, TrackCatalog, TrackSource};
use crate::utils::{fs, id};
use crate::{Error, Result};

/// Pipeline stage, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Acquire,
    Normalize,
    Probe,
    Commit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Normalize => "normalize",
            Self::Probe => "probe",
            Self::Commit => "commit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The download pipeline run for every job.
pub struct DownloadPipeline {
    acquirer: Arc<dyn Acquirer>,
    normalizer: Arc<dyn Normalizer>,
    prober: Arc<dyn Prober>,
    catalog: Arc<dyn TrackCatalog>,
    downloads_dir: PathBuf,
    normalize: NormalizeOptions,
}

impl DownloadPipeline {
    pub fn new(
        acquirer: Arc<dyn Acquirer>,
        normalizer: Arc<dyn Normalizer>,
        prober: Arc<dyn Prober>,
        catalog: Arc<dyn TrackCatalog>,
        downloads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            acquirer,
            normalizer,
            prober,
            catalog,
            downloads_dir: downloads_dir.into(),
            normalize: NormalizeOptions::default(),
        }
    }

    /// Pipeline backed by the external tools named in `config`.
    pub fn from_config(config: &AppConfig, catalog: Arc<dyn TrackCatalog>) -> Self {
        Self::new(
            Arc::new(YtDlpAcquirer::new(&config.tools.ytdlp)),
            Arc::new(FfmpegNormalizer::new(&config.tools.ffmpeg)),
            Arc::new(FfprobeProber::new(&config.tools.ffprobe)),
            catalog,
            &config.paths.downloads_dir,
        )
        .with_normalize_options(
            NormalizeOptions::default().with_bitrate(config.target_bitrate_kbps),
        )
    }

    pub fn with_normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.normalize = options;
        self
    }

    /// Working directory of `job_id`.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.downloads_dir.join(job_id)
    }

    async fn run_stages(&self, job: &Job, job_dir: &Path) -> Result<JobResult> {
        fs::ensure_dir_all_with_op("creating job directory", job_dir).await?;

        debug!(job_id = %job.id, stage = %Stage::Acquire, "Stage started");
        let request = AcquireRequest {
            job_id: job.id.clone(),
            url: job.source.url.clone(),
            output_dir: job_dir.to_path_buf(),
            format: job.format.clone(),
            quality: job.quality.clone(),
        };
        let acquired = self
            .acquirer
            .acquire(&request)
            .await
            .map_err(|e| Error::stage(Stage::Acquire, &job.id, e))?;

        debug!(job_id = %job.id, stage = %Stage::Normalize, "Stage started");
        let normalized = self
            .normalizer
            .normalize(&job.id, &acquired, &self.normalize)
            .await
            .map_err(|e| Error::stage(Stage::Normalize, &job.id, e))?;
        replace_in_place(&normalized, &acquired).await?;

        debug!(job_id = %job.id, stage = %Stage::Probe, "Stage started");
        let metadata = self
            .prober
            .probe(&acquired)
            .await
            .map_err(|e| Error::stage(Stage::Probe, &job.id, e))?;

        debug!(job_id = %job.id, stage = %Stage::Commit, "Stage started");
        let file_path = acquired.to_string_lossy().into_owned();
        let track = Track {
            id: id::track_id(),
            title: metadata.title.clone(),
            artist: metadata.artist.clone(),
            album: metadata.album.clone(),
            duration: metadata.duration,
            bitrate: metadata.bitrate,
            format: job.format.clone(),
            source: TrackSource {
                url: job.source.url.clone(),
                platform: detect_platform(&job.source.url),
            },
            artwork: Artwork::default(),
            file_path: file_path.clone(),
            created_at: Utc::now(),
        };
        let track = self.catalog.add_track(track).await.map_err(|e| match e {
            Error::Commit(_) => e,
            other => Error::Commit(other.to_string()),
        })?;

        Ok(JobResult {
            track_id: track.id,
            file_path,
            metadata,
        })
    }
}

/// Move `normalized` onto `original`, dropping the original bytes.
async fn replace_in_place(normalized: &Path, original: &Path) -> Result<()> {
    tokio::fs::remove_file(original)
        .await
        .map_err(|e| Error::io_path("removing pre-normalization file", original, e))?;
    tokio::fs::rename(normalized, original)
        .await
        .map_err(|e| Error::io_path("moving normalized file into", original, e))
}

#[async_trait]
impl JobProcessor for DownloadPipeline {
    async fn process(&self, job: &Job) -> Result<JobResult> {
        let job_dir = self.job_dir(&job.id);

        match self.run_stages(job, &job_dir).await {
            Ok(result) => {
                info!(
                    job_id = %job.id,
                    track_id = %result.track_id,
                    duration = result.metadata.duration,
                    "Pipeline finished"
                );
                Ok(result)
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    stage = e.failed_stage().map(|s| s.as_str()).unwrap_or("setup"),
                    error = %e,
                    "Pipeline failed"
                );
                match fs::remove_dir_all_if_exists(&job_dir).await {
                    Ok(true) => debug!(job_id = %job.id, "Removed job directory"),
                    Ok(false) => {}
                    Err(cleanup) => {
                        warn!(job_id = %job.id, error = %cleanup, "Failed to remove job directory")
                    }
                }
                Err(e)
            }
        }
    }
}
