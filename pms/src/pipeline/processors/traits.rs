//! Processor traits and related types.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::ProcessError;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::pipeline::job_queue::{Job, JobResult};

/// Runs a whole job and produces its result.
///
/// The scheduler owns the job record; implementations only read it and
/// return a value or an error that the scheduler then applies.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<JobResult>;
}

/// Input for the acquire stage.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub job_id: String,
    pub url: String,
    /// Existing directory the audio file is written into.
    pub output_dir: PathBuf,
    /// Requested audio format (`mp3`, `m4a`, ...).
    pub format: String,
    /// Requested quality (`high`, `medium`, `low` or a 0-9 digit).
    pub quality: String,
}

/// Resolves a source URL into exactly one local audio file.
#[async_trait]
pub trait Acquirer: Send + Sync {
    async fn acquire(&self, request: &AcquireRequest) -> std::result::Result<PathBuf, ProcessError>;
}

/// Loudness normalization target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Integrated loudness target in LUFS.
    pub integrated_lufs: f64,
    /// True-peak ceiling in dBTP.
    pub true_peak_db: f64,
    /// Loudness range target in LU.
    pub loudness_range: f64,
    pub sample_rate_hz: u32,
    pub bitrate_kbps: u32,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            integrated_lufs: -16.0,
            true_peak_db: -1.5,
            loudness_range: 11.0,
            sample_rate_hz: 48_000,
            bitrate_kbps: 256,
        }
    }
}

impl NormalizeOptions {
    pub fn with_bitrate(mut self, bitrate_kbps: u32) -> Self {
        self.bitrate_kbps = bitrate_kbps;
        self
    }

    /// The `loudnorm` audio filter expression.
    pub fn loudnorm_filter(&self) -> String {
        format!(
            "loudnorm=I={}:TP={}:LRA={}",
            self.integrated_lufs, self.true_peak_db, self.loudness_range
        )
    }
}

/// Re-encodes an audio file to the normalization target.
///
/// Returns the path of the newly written file; the caller decides what
/// happens to the input.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(
        &self,
        job_id: &str,
        input: &Path,
        options: &NormalizeOptions,
    ) -> std::result::Result<PathBuf, ProcessError>;
}

/// Metadata extracted from a finished audio file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    /// Duration in whole seconds.
    pub duration: u64,
    /// Bitrate in kbps.
    pub bitrate: u64,
    pub title: String,
    pub artist: String,
    pub album: String,
}

/// Extracts [`TrackMetadata`] from a file.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: &Path) -> std::result::Result<TrackMetadata, ProcessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults() {
        let options = NormalizeOptions::default();
        assert_eq!(options.bitrate_kbps, 256);
        assert_eq!(options.sample_rate_hz, 48_000);
        assert_eq!(options.loudnorm_filter(), "loudnorm=I=-16:TP=-1.5:LRA=11");
    }

    #[test]
    fn test_normalize_with_bitrate() {
        let options = NormalizeOptions::default().with_bitrate(320);
        assert_eq!(options.bitrate_kbps, 320);
    }

    #[test]
    fn test_track_metadata_serializes_camel_case() {
        let metadata = TrackMetadata {
            duration: 215,
            bitrate: 256,
            title: "Song".to_string(),
            artist: "Artist".to_string(),
            album: "Unknown".to_string(),
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["duration"], 215);
        assert_eq!(json["title"], "Song");
    }
}
