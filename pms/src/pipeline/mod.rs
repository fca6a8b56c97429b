//! Job scheduling and the download pipeline.
//!
//! - [`JobQueue`] owns job records, admits them FIFO under a concurrency cap
//!   and mirrors every transition to a [`JobStore`]
//! - [`DownloadPipeline`] runs acquire, normalize, probe and commit for one job
//! - [`processors`] holds the external-tool stage implementations

mod executor;
mod job_queue;
mod platform;
pub mod processors;
mod store;

pub use executor::{DownloadPipeline, Stage};
pub use job_queue::{
    DEFAULT_FORMAT, DEFAULT_QUALITY, JOB_TYPE_DOWNLOAD, Job, JobQueue, JobQueueConfig, JobRequest,
    JobResult, JobSource, JobStats, JobStatus,
};
pub use platform::{Platform, detect_platform};
pub use processors::JobProcessor;
pub use store::{FileJobStore, JobStore, JobTable, MemoryJobStore, TABLE_VERSION};
