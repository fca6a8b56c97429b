//! Runtime configuration.
//!
//! Everything is read from environment variables (a `.env` file is loaded
//! first by `main`), falling back to defaults suitable for the container image.

use std::path::{Path, PathBuf};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::utils::fs;
use crate::Result;

/// Default root for all persistent state.
pub const DEFAULT_DATA_ROOT: &str = "/data";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default normalization bitrate in kbps.
pub const DEFAULT_TARGET_BITRATE_KBPS: u32 = 256;

/// Layout of the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub data_root: PathBuf,
    pub state_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub jobs_json: PathBuf,
    pub library_json: PathBuf,
}

impl DataPaths {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        let data_root = data_root.into();
        let state_dir = data_root.join("state");
        let temp_dir = data_root.join("temp");
        Self {
            downloads_dir: temp_dir.join("downloads"),
            logs_dir: data_root.join("logs"),
            jobs_json: state_dir.join("jobs.json"),
            library_json: state_dir.join("library.json"),
            state_dir,
            temp_dir,
            data_root,
        }
    }

    /// Create every directory of the layout.
    pub async fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.state_dir,
            &self.temp_dir,
            &self.downloads_dir,
            &self.logs_dir,
        ] {
            fs::ensure_dir_all_with_op("creating data directory", dir).await?;
        }
        info!(root = %self.data_root.display(), "Data directories initialized");
        Ok(())
    }
}

/// External tool locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ytdlp: String,
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ytdlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: DataPaths,
    pub bind_address: String,
    pub port: u16,
    /// Maximum number of jobs in `processing` at once. `0` disables dispatch.
    pub job_concurrency: usize,
    pub tools: ToolPaths,
    pub target_bitrate_kbps: u32,
    /// Optional `LOG_LEVEL` applied to this crate's log target.
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: DataPaths::new(DEFAULT_DATA_ROOT),
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            job_concurrency: 1,
            tools: ToolPaths::default(),
            target_bitrate_kbps: DEFAULT_TARGET_BITRATE_KBPS,
            log_level: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = get("DATA_ROOT") {
            config.paths = DataPaths::new(root);
        }

        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            config.bind_address = bind_address;
        }

        if let Some(port) = get("PORT").or_else(|| get("API_PORT")) {
            match port.trim().parse::<u16>() {
                Ok(parsed) => config.port = parsed,
                Err(_) => warn!(value = %port, "Ignoring invalid PORT"),
            }
        }

        if let Some(concurrency) = get("JOB_CONCURRENCY") {
            config.job_concurrency = parse_concurrency(&concurrency);
        }

        if let Some(path) = get("YTDLP_PATH") {
            config.tools.ytdlp = path;
        }
        if let Some(path) = get("FFMPEG_PATH") {
            config.tools.ffmpeg = path;
        }
        if let Some(path) = get("FFPROBE_PATH") {
            config.tools.ffprobe = path;
        }

        if let Some(bitrate) = get("TARGET_BITRATE_KBPS") {
            match bitrate.trim().parse::<u32>() {
                Ok(parsed) if parsed > 0 => config.target_bitrate_kbps = parsed,
                _ => warn!(value = %bitrate, "Ignoring invalid TARGET_BITRATE_KBPS"),
            }
        }

        config.log_level = get("LOG_LEVEL").map(|l| l.trim().to_lowercase());

        config
    }

    pub fn data_root(&self) -> &Path {
        &self.paths.data_root
    }
}

/// Unparsable values fall back to a single worker; `0` is honored. Values the
/// scheduler cannot represent are clamped to its permit limit.
fn parse_concurrency(raw: &str) -> usize {
    let value = raw.trim().parse::<usize>().unwrap_or(1);
    if value > Semaphore::MAX_PERMITS {
        warn!(
            requested = value,
            max = Semaphore::MAX_PERMITS,
            "JOB_CONCURRENCY too large, clamping"
        );
        return Semaphore::MAX_PERMITS;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.port, 3001);
        assert_eq!(config.job_concurrency, 1);
        assert_eq!(config.target_bitrate_kbps, 256);
        assert_eq!(config.tools, ToolPaths::default());
        assert_eq!(config.data_root(), Path::new("/data"));
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_data_paths_layout() {
        let paths = DataPaths::new("/srv/pms");
        assert_eq!(paths.jobs_json, PathBuf::from("/srv/pms/state/jobs.json"));
        assert_eq!(paths.library_json, PathBuf::from("/srv/pms/state/library.json"));
        assert_eq!(paths.downloads_dir, PathBuf::from("/srv/pms/temp/downloads"));
        assert_eq!(paths.logs_dir, PathBuf::from("/srv/pms/logs"));
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATA_ROOT", "/tmp/pms"),
            ("PORT", "8080"),
            ("JOB_CONCURRENCY", "3"),
            ("FFMPEG_PATH", "/opt/ffmpeg"),
            ("LOG_LEVEL", "DEBUG"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.job_concurrency, 3);
        assert_eq!(config.tools.ffmpeg, "/opt/ffmpeg");
        assert_eq!(config.tools.ffprobe, "ffprobe");
        assert_eq!(config.paths.state_dir, PathBuf::from("/tmp/pms/state"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_api_port_alias() {
        let config = AppConfig::from_lookup(lookup_from(&[("API_PORT", "9000")]));
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_concurrency_parsing() {
        assert_eq!(parse_concurrency("0"), 0);
        assert_eq!(parse_concurrency(" 4 "), 4);
        assert_eq!(parse_concurrency("many"), 1);
        assert_eq!(parse_concurrency("-2"), 1);
        assert_eq!(
            parse_concurrency(&usize::MAX.to_string()),
            Semaphore::MAX_PERMITS
        );
    }

    #[tokio::test]
    async fn test_ensure_directories() {
        let temp = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(temp.path());
        paths.ensure_directories().await.unwrap();
        assert!(paths.state_dir.is_dir());
        assert!(paths.downloads_dir.is_dir());
        assert!(paths.logs_dir.is_dir());
    }
}
