//! Durable storage for the job table.
//!
//! The table is one JSON document: `{ version, updatedAt, jobs: { [id]: Job } }`.
//! The scheduler keeps the authoritative copy in memory and mirrors it here
//! after every transition.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::job_queue::{Job, JobStatus};
use crate::utils::fs;
use crate::{Error, Result};

/// Schema version written into every table.
pub const TABLE_VERSION: u32 = 1;

fn default_version() -> u32 {
    TABLE_VERSION
}

/// Point-in-time copy of every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTable {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub jobs: BTreeMap<String, Job>,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self::from_jobs(BTreeMap::new())
    }

    pub fn from_jobs(jobs: BTreeMap<String, Job>) -> Self {
        Self {
            version: TABLE_VERSION,
            updated_at: Utc::now(),
            jobs,
        }
    }

    /// Fail every job left `processing` by a previous run.
    ///
    /// Returns the ids that were changed.
    pub fn recover_interrupted(&mut self) -> Vec<String> {
        let mut recovered = Vec::new();
        for job in self.jobs.values_mut() {
            if job.status == JobStatus::Processing {
                job.fail(Error::Interrupted.to_string());
                recovered.push(job.id.clone());
            }
        }
        if !recovered.is_empty() {
            self.updated_at = Utc::now();
        }
        recovered
    }

    /// Ids of `queued` jobs in admission order: oldest first, ties broken by id.
    pub fn queued_ids(&self) -> Vec<String> {
        let mut queued: Vec<&Job> = self
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Queued)
            .collect();
        queued.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        queued.into_iter().map(|job| job.id.clone()).collect()
    }
}

/// Load and save of the job table.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Read the table. A store that has never been written yields an empty table.
    async fn load(&self) -> Result<JobTable>;

    /// Replace the stored table with `table`.
    async fn save(&self, table: &JobTable) -> Result<()>;
}

/// JSON file on disk, replaced atomically on every save.
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move an unparsable table aside so later saves cannot overwrite it.
    ///
    /// Returns the new location.
    async fn quarantine(&self) -> Result<PathBuf> {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%d%H%M%S")));
        let target = self.path.with_file_name(name);
        tokio::fs::rename(&self.path, &target)
            .await
            .map_err(|e| Error::io_path("quarantining job table", &self.path, e))?;
        Ok(target)
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn load(&self) -> Result<JobTable> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No job table on disk, starting empty");
                return Ok(JobTable::new());
            }
            Err(e) => return Err(Error::io_path("reading job table", &self.path, e)),
        };

        let table: JobTable = match serde_json::from_slice(&content) {
            Ok(table) => table,
            Err(e) => {
                match self.quarantine().await {
                    Ok(target) => warn!(
                        path = %self.path.display(),
                        moved_to = %target.display(),
                        error = %e,
                        "Job table is unreadable, moved aside"
                    ),
                    Err(move_err) => warn!(
                        path = %self.path.display(),
                        error = %move_err,
                        "Failed to move unreadable job table aside"
                    ),
                }
                return Err(e.into());
            }
        };
        info!(
            path = %self.path.display(),
            jobs = table.jobs.len(),
            "Loaded job table"
        );
        Ok(table)
    }

    async fn save(&self, table: &JobTable) -> Result<()> {
        let json = serde_json::to_vec_pretty(table)?;
        fs::write_atomic(&self.path, &json)
            .await
            .map_err(|e| Error::Persistence(format!("{}: {}", self.path.display(), e)))
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryJobStore {
    table: Mutex<Option<JobTable>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `table`, as if left behind by a previous run.
    pub fn with_table(table: JobTable) -> Self {
        Self {
            table: Mutex::new(Some(table)),
            ..Self::default()
        }
    }

    /// Make every subsequent save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Last successfully saved table.
    pub fn snapshot(&self) -> Option<JobTable> {
        self.table.lock().clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn load(&self) -> Result<JobTable> {
        Ok(self.table.lock().clone().unwrap_or_default())
    }

    async fn save(&self, table: &JobTable) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Persistence("memory store rejected write".to_string()));
        }
        *self.table.lock() = Some(table.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::job_queue::JobRequest;

    fn job(id: &str, status: JobStatus) -> Job {
        let mut job = Job::new(id, JobRequest::new("https://example.com/a"));
        job.status = status;
        job
    }

    fn table_of(jobs: Vec<Job>) -> JobTable {
        JobTable::from_jobs(jobs.into_iter().map(|j| (j.id.clone(), j)).collect())
    }

    #[test]
    fn test_recover_interrupted() {
        let mut table = table_of(vec![
            job("job_a", JobStatus::Processing),
            job("job_b", JobStatus::Queued),
            job("job_c", JobStatus::Completed),
        ]);

        let recovered = table.recover_interrupted();
        assert_eq!(recovered, vec!["job_a".to_string()]);

        let a = &table.jobs["job_a"];
        assert_eq!(a.status, JobStatus::Failed);
        assert_eq!(a.error.as_deref(), Some("Interrupted by restart"));
        assert!(a.result.is_none());
        assert_eq!(table.jobs["job_b"].status, JobStatus::Queued);
        assert_eq!(table.jobs["job_c"].status, JobStatus::Completed);
    }

    #[test]
    fn test_queued_ids_order_by_creation() {
        let mut first = job("job_z", JobStatus::Queued);
        let mut second = job("job_a", JobStatus::Queued);
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        second.created_at = Utc::now();
        let table = table_of(vec![second, first, job("job_m", JobStatus::Failed)]);

        assert_eq!(table.queued_ids(), vec!["job_z".to_string(), "job_a".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(temp.path().join("state/jobs.json"));
        let table = store.load().await.unwrap();
        assert!(table.jobs.is_empty());
        assert_eq!(table.version, TABLE_VERSION);
    }

    #[tokio::test]
    async fn test_file_store_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state/jobs.json");
        let store = FileJobStore::new(&path);

        let table = table_of(vec![job("job_1", JobStatus::Queued)]);
        store.save(&table).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert!(raw["updatedAt"].is_string());
        assert_eq!(raw["jobs"]["job_1"]["status"], "queued");
        assert_eq!(raw["jobs"]["job_1"]["source"]["url"], "https://example.com/a");

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs["job_1"].status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("jobs.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = FileJobStore::new(&path);
        assert!(matches!(store.load().await, Err(Error::Serialization(_))));

        assert!(!path.exists());
        let moved: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(moved.len(), 1);
        let name = moved[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("jobs.json.corrupt-"));
        assert_eq!(std::fs::read(&moved[0]).unwrap(), b"{ not json");
    }

    #[tokio::test]
    async fn test_file_store_save_failure_is_persistence_error() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"file, not a directory").unwrap();

        let store = FileJobStore::new(blocker.join("jobs.json"));
        let err = store.save(&JobTable::new()).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryJobStore::new();
        assert!(store.load().await.unwrap().jobs.is_empty());

        store.save(&table_of(vec![job("job_1", JobStatus::Queued)])).await.unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().await.unwrap().jobs.len(), 1);

        store.set_fail_saves(true);
        assert!(store.save(&JobTable::new()).await.is_err());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot().unwrap().jobs.len(), 1);
    }
}
