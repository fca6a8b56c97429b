//! Captured execution of external tools.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

/// Number of stderr characters kept on a [`ProcessError`].
pub const DEFAULT_STDERR_CAPTURE: usize = 500;

/// Failure of an external tool invocation.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started (not installed, not executable, ...).
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process was started but waiting on it failed.
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("{program} exited with {}: {stderr}", describe_code(.code))]
    ExitStatus {
        program: String,
        /// `None` when the process was terminated by a signal.
        code: Option<i32>,
        stderr: String,
    },

    /// The process exited with code 0 but its expected output is absent.
    #[error("{program} did not produce {expected}")]
    MissingArtifact {
        program: String,
        expected: String,
        stderr: String,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

impl ProcessError {
    /// Build a [`ProcessError::MissingArtifact`] with a truncated stderr capture.
    pub fn missing_artifact(
        program: impl Into<String>,
        expected: impl Into<String>,
        stderr: &str,
    ) -> Self {
        Self::MissingArtifact {
            program: program.into(),
            expected: expected.into(),
            stderr: truncate_output(stderr, DEFAULT_STDERR_CAPTURE),
        }
    }

    /// Name of the program that failed.
    pub fn program(&self) -> &str {
        match self {
            Self::Spawn { program, .. }
            | Self::Wait { program, .. }
            | Self::ExitStatus { program, .. }
            | Self::MissingArtifact { program, .. } => program,
        }
    }

    /// Truncated stderr capture, when the process got far enough to write one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ExitStatus { stderr, .. } | Self::MissingArtifact { stderr, .. } => {
                Some(stderr.as_str())
            }
            Self::Spawn { .. } | Self::Wait { .. } => None,
        }
    }
}

/// Everything a finished process wrote, plus how it exited.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CapturedOutput {
    /// Last non-empty line of stdout, trimmed.
    pub fn last_stdout_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .rev()
            .find(|line| !line.is_empty())
    }
}

/// Keep at most `max` trailing characters of `text`.
///
/// Tools print their fatal diagnostics last, so the tail is what survives.
pub fn truncate_output(text: &str, max: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }

    let tail: String = text.chars().skip(count - max).collect();
    format!("...{}", tail)
}

/// Spawn `command`, collect stdout and stderr as they arrive, and wait for exit.
///
/// Only spawn and wait failures are errors here; the exit status is returned
/// to the caller untouched. Use [`run_checked`] to also reject non-zero exits.
pub async fn run_captured(
    program: &str,
    command: &mut Command,
) -> Result<CapturedOutput, ProcessError> {
    let start = Instant::now();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })?;

    debug!(program, pid = ?child.id(), "Process started");

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (stdout, stderr, status) = tokio::join!(
        collect_lines(stdout, program, "stdout"),
        collect_lines(stderr, program, "stderr"),
        child.wait(),
    );

    let status = status.map_err(|source| ProcessError::Wait {
        program: program.to_string(),
        source,
    })?;

    let duration = start.elapsed();
    debug!(
        program,
        code = ?status.code(),
        elapsed_ms = duration.as_millis() as u64,
        "Process exited"
    );

    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
        duration,
    })
}

/// Like [`run_captured`], but a non-zero exit becomes [`ProcessError::ExitStatus`].
pub async fn run_checked(
    program: &str,
    command: &mut Command,
) -> Result<CapturedOutput, ProcessError> {
    let output = run_captured(program, command).await?;
    if !output.status.success() {
        return Err(ProcessError::ExitStatus {
            program: program.to_string(),
            code: output.status.code(),
            stderr: truncate_output(&output.stderr, DEFAULT_STDERR_CAPTURE),
        });
    }
    Ok(output)
}

async fn collect_lines<R>(reader: Option<R>, program: &str, stream: &'static str) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    let mut collected = String::new();
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!(program, stream, "{}", line);
                collected.push_str(&line);
                collected.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                debug!(program, stream, error = %e, "Stopped reading process output");
                break;
            }
        }
    }
    collected
}
