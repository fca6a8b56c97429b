//! Normalize stage backed by `ffmpeg`.
//!
//! Runs a single-pass EBU R128 `loudnorm` filter and re-encodes at a fixed
//! sample rate and bitrate into a sibling file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{ProcessError, run_checked, tokio_command};
use tracing::{debug, info};

use super::traits::{NormalizeOptions, Normalizer};

/// Path of the normalized sibling of `input`: `<stem>_normalized<.ext>`.
pub fn normalized_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match input.extension() {
        Some(ext) => format!("{}_normalized.{}", stem, ext.to_string_lossy()),
        None => format!("{}_normalized", stem),
    };
    input.with_file_name(file_name)
}

/// Normalizer that shells out to `ffmpeg`.
pub struct FfmpegNormalizer {
    ffmpeg_path: String,
}

impl FfmpegNormalizer {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Build FFmpeg command arguments for loudness normalization.
    pub fn build_args(&self, input: &Path, output: &Path, options: &NormalizeOptions) -> Vec<String> {
        let mut args = vec!["-y".to_string()];
        args.extend(["-i".to_string(), input.to_string_lossy().into_owned()]);
        args.extend(["-af".to_string(), options.loudnorm_filter()]);
        args.extend(["-ar".to_string(), options.sample_rate_hz.to_string()]);
        args.extend(["-b:a".to_string(), format!("{}k", options.bitrate_kbps)]);
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

impl Default for FfmpegNormalizer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Normalizer for FfmpegNormalizer {
    async fn normalize(
        &self,
        job_id: &str,
        input: &Path,
        options: &NormalizeOptions,
    ) -> Result<PathBuf, ProcessError> {
        let output_path = normalized_path(input);
        let args = self.build_args(input, &output_path, options);
        debug!(job_id, ?args, "Running ffmpeg loudnorm");

        let mut cmd = tokio_command(&self.ffmpeg_path);
        cmd.args(&args);
        let output = run_checked(&self.ffmpeg_path, &mut cmd).await?;

        if !tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            return Err(ProcessError::missing_artifact(
                &self.ffmpeg_path,
                format!("{}", output_path.display()),
                &output.stderr,
            ));
        }

        info!(
            job_id,
            bitrate_kbps = options.bitrate_kbps,
            elapsed_ms = output.duration.as_millis() as u64,
            "Audio normalized"
        );
        Ok(output_path)
    }
}
