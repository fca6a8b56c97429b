//! Probe stage backed by `ffprobe`.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use process_utils::{ProcessError, run_checked, tokio_command};
use serde::Deserialize;
use tracing::{debug, warn};

use super::traits::{Prober, TrackMetadata};

/// Fallback for missing artist and album tags.
pub const UNKNOWN_TAG: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

impl ProbeFormat {
    fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }
}

fn parse_number(raw: Option<&str>) -> f64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(0.0)
}

/// Turn ffprobe's JSON document into [`TrackMetadata`].
///
/// The title falls back to the file stem, artist and album to [`UNKNOWN_TAG`].
pub fn parse_probe_output(
    json: &str,
    file_path: &Path,
) -> Result<TrackMetadata, serde_json::Error> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    let format = output.format.unwrap_or_default();

    let duration = parse_number(format.duration.as_deref()).round() as u64;
    let bitrate = (parse_number(format.bit_rate.as_deref()) / 1000.0).round() as u64;

    let title = match format.tag("title") {
        Some(title) => title.to_string(),
        None => file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    Ok(TrackMetadata {
        duration,
        bitrate,
        title,
        artist: format.tag("artist").unwrap_or(UNKNOWN_TAG).to_string(),
        album: format.tag("album").unwrap_or(UNKNOWN_TAG).to_string(),
    })
}

/// Prober that shells out to `ffprobe`.
pub struct FfprobeProber {
    ffprobe_path: String,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    pub fn build_args(&self, path: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().into_owned(),
        ]
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<TrackMetadata, ProcessError> {
        let mut cmd = tokio_command(&self.ffprobe_path);
        cmd.args(self.build_args(path));
        let output = run_checked(&self.ffprobe_path, &mut cmd).await?;

        match parse_probe_output(&output.stdout, path) {
            Ok(metadata) => {
                debug!(path = %path.display(), ?metadata, "Probed audio file");
                Ok(metadata)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unparsable ffprobe output");
                Err(ProcessError::missing_artifact(
                    &self.ffprobe_path,
                    "parsable metadata",
                    &output.stderr,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "streams": [{"codec_name": "mp3"}],
        "format": {
            "filename": "/tmp/a.mp3",
            "duration": "215.462000",
            "bit_rate": "256412",
            "tags": {"title": "Song", "ARTIST": "Someone", "Album": "Record"}
        }
    }"#;

    #[test]
    fn test_parse_full_output() {
        let metadata = parse_probe_output(FULL, Path::new("/tmp/a.mp3")).unwrap();
        assert_eq!(
            metadata,
            TrackMetadata {
                duration: 215,
                bitrate: 256,
                title: "Song".to_string(),
                artist: "Someone".to_string(),
                album: "Record".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_falls_back_when_tags_missing() {
        let json = r#"{"format": {"duration": "59.6", "bit_rate": "127600"}}"#;
        let metadata = parse_probe_output(json, Path::new("/tmp/job/My Mix.mp3")).unwrap();
        assert_eq!(metadata.duration, 60);
        assert_eq!(metadata.bitrate, 128);
        assert_eq!(metadata.title, "My Mix");
        assert_eq!(metadata.artist, UNKNOWN_TAG);
        assert_eq!(metadata.album, UNKNOWN_TAG);
    }

    #[test]
    fn test_parse_without_format_section() {
        let metadata = parse_probe_output("{}", Path::new("/tmp/x.mp3")).unwrap();
        assert_eq!(metadata.duration, 0);
        assert_eq!(metadata.bitrate, 0);
        assert_eq!(metadata.title, "x");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_probe_output("not json", Path::new("/tmp/x.mp3")).is_err());
    }

    #[test]
    fn test_build_args() {
        let prober = FfprobeProber::default();
        assert_eq!(
            prober.build_args(Path::new("/tmp/a.mp3")),
            vec![
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "/tmp/a.mp3",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_output_is_missing_artifact() {
        let prober = FfprobeProber::new("true");
        let err = prober.probe(Path::new("/tmp/a.mp3")).await.unwrap_err();
        assert!(matches!(err, ProcessError::MissingArtifact { .. }));
    }
}
