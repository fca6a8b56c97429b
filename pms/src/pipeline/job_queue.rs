//! Durable FIFO job queue with bounded concurrency.
//!
//! The queue owns every [`Job`] record. Submissions are appended to a pending
//! list and promoted to `processing` by [`JobQueue::dispatch`] while a permit
//! is available. Each promoted job runs on its own task; when it settles the
//! queue applies the outcome, releases the permit and dispatches again, so the
//! backlog drains without a poller.
//!
//! Every transition is mirrored to a [`JobStore`]. Store failures are logged
//! and otherwise ignored: the in-memory table stays authoritative.

use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use super::processors::{JobProcessor, TrackMetadata};
use super::store::{JobStore, JobTable};
use crate::utils::id;
use crate::{Error, Result};

/// The only job type this service runs.
pub const JOB_TYPE_DOWNLOAD: &str = "download";

/// Default requested output format.
pub const DEFAULT_FORMAT: &str = "mp3";

/// Default requested quality.
pub const DEFAULT_QUALITY: &str = "high";

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a free slot.
    Queued,
    /// A pipeline is running for this job.
    Processing,
    /// Finished with a result.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a job's media comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSource {
    pub url: String,
}

/// Success payload of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub track_id: String,
    pub file_path: String,
    pub metadata: TrackMetadata,
}

/// A submission as received from a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}

impl JobRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: None,
            quality: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Trimmed URL, or a validation error when it is blank.
    pub fn validated_url(&self) -> Result<&str> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(Error::validation("A valid URL is required"));
        }
        Ok(url)
    }
}

fn non_blank(value: Option<&str>, default: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Lifecycle record of one submission.
///
/// Once a job leaves `processing`, exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(rename = "type", default = "default_job_type")]
    pub job_type: String,
    pub status: JobStatus,
    /// Coarse completion fraction in `[0, 1]`.
    #[serde(default)]
    pub progress: f64,
    pub source: JobSource,
    pub format: String,
    pub quality: String,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_job_type() -> String {
    JOB_TYPE_DOWNLOAD.to_string()
}

impl Job {
    /// Create a queued job. The URL is stored as given; validation happens in
    /// [`JobQueue::submit`].
    pub fn new(id: impl Into<String>, request: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            job_type: default_job_type(),
            status: JobStatus::Queued,
            progress: 0.0,
            source: JobSource {
                url: request.url.trim().to_string(),
            },
            format: non_blank(request.format.as_deref(), DEFAULT_FORMAT),
            quality: non_blank(request.quality.as_deref(), DEFAULT_QUALITY),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, result: JobResult) {
        self.status = JobStatus::Completed;
        self.progress = 1.0;
        self.result = Some(result);
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}

/// Configuration for the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueueConfig {
    /// Maximum number of jobs in `processing` at once. `0` disables dispatch.
    pub concurrency: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

impl JobQueueConfig {
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency }
    }
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Jobs holding a concurrency slot.
    pub running: usize,
    /// Entries in the pending list, including stale ones not yet skipped.
    pub pending: usize,
    pub concurrency: usize,
}

#[derive(Default)]
struct QueueState {
    jobs: BTreeMap<String, Job>,
    pending: VecDeque<String>,
    running: usize,
}

impl QueueState {
    /// Pop pending ids until one is still `queued`, and promote it.
    fn promote_next(&mut self) -> Option<Job> {
        while let Some(id) = self.pending.pop_front() {
            match self.jobs.get_mut(&id) {
                Some(job) if job.status == JobStatus::Queued => {
                    job.mark_processing();
                    self.running += 1;
                    return Some(job.clone());
                }
                Some(job) => {
                    debug!(job_id = %id, status = %job.status, "Skipping pending job that is no longer queued");
                }
                None => {
                    warn!(job_id = %id, "Skipping unknown pending job");
                }
            }
        }
        None
    }
}

/// The job queue service.
pub struct JobQueue {
    config: JobQueueConfig,
    state: Mutex<QueueState>,
    /// One permit per concurrency slot.
    permits: Arc<Semaphore>,
    store: Arc<dyn JobStore>,
    processor: Arc<dyn JobProcessor>,
    /// Serializes snapshot-and-write so saves land in transition order.
    persist_lock: tokio::sync::Mutex<()>,
    idle: Notify,
}

impl JobQueue {
    /// Create an empty queue without reading the store.
    pub fn new(
        mut config: JobQueueConfig,
        store: Arc<dyn JobStore>,
        processor: Arc<dyn JobProcessor>,
    ) -> Arc<Self> {
        if config.concurrency > Semaphore::MAX_PERMITS {
            warn!(
                requested = config.concurrency,
                max = Semaphore::MAX_PERMITS,
                "Job concurrency clamped"
            );
            config.concurrency = Semaphore::MAX_PERMITS;
        }

        Arc::new(Self {
            permits: Arc::new(Semaphore::new(config.concurrency)),
            config,
            state: Mutex::new(QueueState::default()),
            store,
            processor,
            persist_lock: tokio::sync::Mutex::new(()),
            idle: Notify::new(),
        })
    }

    /// Load the stored table, fail jobs interrupted by the previous run,
    /// re-admit jobs still queued and start dispatching.
    ///
    /// An unreadable table is logged and replaced by an empty one. The store
    /// is then left untouched until the first real transition.
    pub async fn open(
        config: JobQueueConfig,
        store: Arc<dyn JobStore>,
        processor: Arc<dyn JobProcessor>,
    ) -> Arc<Self> {
        let (mut table, loaded) = match store.load().await {
            Ok(table) => (table, true),
            Err(e) => {
                error!(error = %e, "Failed to load job table, starting empty");
                (JobTable::new(), false)
            }
        };

        let recovered = table.recover_interrupted();
        for job_id in &recovered {
            warn!(job_id = %job_id, "Job was processing at shutdown, marked failed");
        }

        let pending: VecDeque<String> = table.queued_ids().into();
        info!(
            jobs = table.jobs.len(),
            interrupted = recovered.len(),
            requeued = pending.len(),
            concurrency = config.concurrency,
            "Job queue recovered"
        );

        let queue = Self::new(config, store, processor);
        {
            let mut state = queue.state.lock();
            state.jobs = table.jobs;
            state.pending = pending;
        }

        if loaded {
            queue.persist().await;
        }
        queue.dispatch();
        queue
    }

    pub fn config(&self) -> &JobQueueConfig {
        &self.config
    }

    /// Create a queued job, persist it and trigger dispatch.
    ///
    /// Returns the job as created; processing happens afterward.
    pub async fn submit(self: &Arc<Self>, request: JobRequest) -> Result<Job> {
        request.validated_url()?;

        let job = Job::new(id::job_id(), request);
        {
            let mut state = self.state.lock();
            state.jobs.insert(job.id.clone(), job.clone());
            state.pending.push_back(job.id.clone());
        }
        info!(job_id = %job.id, url = %job.source.url, format = %job.format, "Job enqueued");

        self.persist().await;
        self.dispatch();
        Ok(job)
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.state.lock().jobs.get(id).cloned()
    }

    /// All jobs, ordered by id.
    pub fn list(&self) -> Vec<Job> {
        self.state.lock().jobs.values().cloned().collect()
    }

    pub fn stats(&self) -> JobStats {
        let state = self.state.lock();
        let mut stats = JobStats {
            running: state.running,
            pending: state.pending.len(),
            concurrency: self.config.concurrency,
            ..JobStats::default()
        };
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Promote pending jobs to `processing` while slots are free.
    ///
    /// Safe to call at any time from any task; it never blocks.
    pub fn dispatch(self: &Arc<Self>) {
        loop {
            let (job, permit) = {
                let mut state = self.state.lock();
                if state.pending.is_empty() {
                    return;
                }
                let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                    return;
                };
                let Some(job) = state.promote_next() else {
                    return;
                };
                (job, permit)
            };

            let queue = Arc::clone(self);
            tokio::spawn(async move {
                queue.run_job(job, permit).await;
            });
        }
    }

    async fn run_job(self: Arc<Self>, job: Job, permit: OwnedSemaphorePermit) {
        let job_id = job.id.clone();
        self.persist().await;
        info!(job_id = %job_id, "Job processing started");

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.processor.process(&job))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(Error::Other("job processor panicked".to_string())));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        {
            let mut state = self.state.lock();
            if let Some(entry) = state.jobs.get_mut(&job_id) {
                match outcome {
                    Ok(result) => {
                        info!(job_id = %job_id, track_id = %result.track_id, elapsed_ms, "Job completed");
                        entry.complete(result);
                    }
                    Err(e) => {
                        error!(
                            job_id = %job_id,
                            stage = ?e.failed_stage(),
                            error = %e,
                            elapsed_ms,
                            "Job failed"
                        );
                        entry.fail(e.to_string());
                    }
                }
            }
        }

        self.persist().await;

        {
            let mut state = self.state.lock();
            state.running = state.running.saturating_sub(1);
        }
        drop(permit);

        self.dispatch();
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }

    fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.running == 0 && (state.pending.is_empty() || self.config.concurrency == 0)
    }

    /// Wait until nothing is running and nothing dispatchable is pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Mirror the current table to the store. Failures are logged only.
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let table = JobTable::from_jobs(self.state.lock().jobs.clone());
        if let Err(e) = self.store.save(&table).await {
            error!(error = %e, "Failed to persist job table");
        }
    }
}
