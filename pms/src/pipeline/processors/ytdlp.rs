//! Acquire stage backed by `yt-dlp`.
//!
//! yt-dlp resolves the source page, downloads the best audio stream,
//! extracts it to the requested format and embeds thumbnail and tags.
//! The final on-disk path is read back from `--print after_move:filepath`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{ProcessError, run_checked, tokio_command};
use tracing::{debug, info};

use super::traits::{AcquireRequest, Acquirer};

/// yt-dlp `--audio-quality` value for a requested quality.
///
/// Named qualities map onto the VBR scale (0 best, 9 worst). A bare digit is
/// passed through; anything else means best.
pub fn audio_quality_arg(quality: &str) -> &str {
    match quality.trim().to_ascii_lowercase().as_str() {
        "high" => "0",
        "medium" => "5",
        "low" => "9",
        _ => {
            let trimmed = quality.trim();
            if trimmed.len() == 1 && trimmed.chars().all(|c| c.is_ascii_digit()) {
                trimmed
            } else {
                "0"
            }
        }
    }
}

/// Acquirer that shells out to `yt-dlp`.
pub struct YtDlpAcquirer {
    ytdlp_path: String,
}

impl YtDlpAcquirer {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
        }
    }

    /// Build yt-dlp arguments for one acquisition.
    pub fn build_args(&self, request: &AcquireRequest) -> Vec<String> {
        let template = output_template(&request.output_dir);

        let mut args: Vec<String> = vec!["-f".into(), "bestaudio".into(), "-x".into()];
        args.extend(["--audio-format".to_string(), request.format.clone()]);
        args.extend([
            "--audio-quality".to_string(),
            audio_quality_arg(&request.quality).to_string(),
        ]);
        args.push("--embed-thumbnail".into());
        args.push("--add-metadata".into());
        args.push("--no-playlist".into());
        args.extend(["-o".to_string(), template]);
        args.extend(["--print".to_string(), "after_move:filepath".to_string()]);
        args.push(request.url.clone());
        args
    }
}

impl Default for YtDlpAcquirer {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

/// Output template inside `dir`, with the title capped at 200 characters.
fn output_template(dir: &Path) -> String {
    dir.join("%(title).200s.%(ext)s").to_string_lossy().into_owned()
}

#[async_trait]
impl Acquirer for YtDlpAcquirer {
    async fn acquire(&self, request: &AcquireRequest) -> Result<PathBuf, ProcessError> {
        let args = self.build_args(request);
        debug!(job_id = %request.job_id, ?args, "Running yt-dlp");

        let mut cmd = tokio_command(&self.ytdlp_path);
        cmd.args(&args).current_dir(&request.output_dir);
        let output = run_checked(&self.ytdlp_path, &mut cmd).await?;

        let Some(line) = output.last_stdout_line() else {
            return Err(ProcessError::missing_artifact(
                &self.ytdlp_path,
                "an output file path",
                &output.stderr,
            ));
        };

        let path = PathBuf::from(line);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ProcessError::missing_artifact(
                &self.ytdlp_path,
                format!("the reported file {}", path.display()),
                &output.stderr,
            ));
        }

        info!(
            job_id = %request.job_id,
            path = %path.display(),
            elapsed_ms = output.duration.as_millis() as u64,
            "Source acquired"
        );
        Ok(path)
    }
}
