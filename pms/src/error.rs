//! Application-wide error types.

use std::path::{Path, PathBuf};

use process_utils::ProcessError;
use thiserror::Error;

use crate::pipeline::Stage;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller input is malformed; nothing was queued.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// An external tool failed while running a pipeline stage.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        job_id: String,
        #[source]
        source: ProcessError,
    },

    /// The catalog rejected the committed track.
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Recorded on jobs that were `processing` when the process died.
    #[error("Interrupted by restart")]
    Interrupted,

    /// A durable write failed. Logged by the scheduler, never surfaced to callers.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} {path}: {source}")]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn stage(stage: Stage, job_id: impl Into<String>, source: ProcessError) -> Self {
        Self::Stage {
            stage,
            job_id: job_id.into(),
            source,
        }
    }

    /// The pipeline stage this error came from, if any.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            Self::Commit(_) => Some(Stage::Commit),
            _ => None,
        }
    }
}
