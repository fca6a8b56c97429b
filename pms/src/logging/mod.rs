//! Logging setup with a reloadable filter and daily rolling files.
//!
//! This module provides:
//! - Runtime log level changes via `tracing_subscriber::reload`
//! - Log file retention cleanup (deletes logs older than 7 days)
//! - Local timezone timestamps for logs

use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "pms=info,process_utils=info,tower_http=info";

/// Prefix of the rolling log files: `pms.log.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "pms.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Formats timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Pick the startup filter directive.
///
/// `RUST_LOG` wins when set. Otherwise a recognized `LOG_LEVEL` is applied to
/// this service's own targets, and anything else falls back to
/// [`DEFAULT_LOG_FILTER`].
pub fn resolve_filter_directive(rust_log: Option<&str>, log_level: Option<&str>) -> String {
    if let Some(directive) = rust_log.map(str::trim).filter(|d| !d.is_empty()) {
        return directive.to_string();
    }

    match log_level.map(|l| l.trim().to_ascii_lowercase()) {
        Some(level) if LOG_LEVELS.contains(&level.as_str()) => {
            format!("pms={level},process_utils={level},tower_http=info")
        }
        _ => DEFAULT_LOG_FILTER.to_string(),
    }
}

/// Handle to the live logging setup.
pub struct LoggingConfig {
    handle: FilterHandle,
    log_dir: PathBuf,
}

impl LoggingConfig {
    fn new(handle: FilterHandle, log_dir: PathBuf) -> Self {
        Self { handle, log_dir }
    }

    /// Get the current filter directive string.
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Replace the filter directive (e.g. `"pms=debug,tower_http=warn"`).
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let new_filter = EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::validation(format!("Invalid filter directive: {}", e)))?;

        self.handle
            .reload(new_filter)
            .map_err(|e| crate::Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Delete expired log files now and then once a day until cancelled.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let log_dir = self.log_dir.clone();

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);

            loop {
                if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS).await {
                    warn!(error = %e, "Failed to cleanup old logs");
                }

                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(cleanup_interval) => {}
                }
            }
        });
    }
}

/// Delete log files older than `retention_days`.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    let cutoff_ts = cutoff.timestamp();
    let prefix = format!("{}.", LOG_FILE_PREFIX);

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let Some(date_str) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|name| name.strip_prefix(&prefix))
        else {
            continue;
        };

        if let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
            let file_ts = file_date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp())
                .unwrap_or(0);

            if file_ts < cutoff_ts {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to delete old log file");
                } else {
                    deleted_count += 1;
                    debug!(path = %path.display(), "Deleted old log file");
                }
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

/// Initialize logging to the console and to daily files under `log_dir`.
///
/// Keep the returned guard alive for the lifetime of the process.
pub fn init_logging(
    log_dir: &Path,
    log_level: Option<&str>,
) -> crate::Result<(Arc<LoggingConfig>, WorkerGuard)> {
    let log_path = log_dir.to_path_buf();
    fs::ensure_dir_all_sync_with_op("creating log directory", &log_path)?;

    let file_appender = tracing_appender::rolling::daily(&log_path, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = resolve_filter_directive(rust_log.as_deref(), log_level);
    let initial_filter =
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    let config = Arc::new(LoggingConfig::new(filter_handle, log_path));

    Ok((config, guard))
}

/// Log targets worth tuning, for API responses.
pub fn available_modules() -> Vec<(&'static str, &'static str)> {
    vec![
        ("pms", "Main application"),
        ("pms::pipeline", "Job queue and download pipeline"),
        ("pms::api", "HTTP API"),
        ("process_utils", "External tool invocations"),
        ("tower_http", "HTTP middleware"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("pms=info"));
        assert!(DEFAULT_LOG_FILTER.contains("process_utils=info"));
    }

    #[test]
    fn test_resolve_filter_directive() {
        assert_eq!(
            resolve_filter_directive(Some("pms=trace"), Some("warn")),
            "pms=trace"
        );
        assert_eq!(
            resolve_filter_directive(None, Some("DEBUG")),
            "pms=debug,process_utils=debug,tower_http=info"
        );
        assert_eq!(resolve_filter_directive(None, Some("loud")), DEFAULT_LOG_FILTER);
        assert_eq!(resolve_filter_directive(Some("  "), None), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_available_modules() {
        let modules = available_modules();
        assert!(modules.iter().any(|(name, _)| *name == "pms"));
    }

    #[tokio::test]
    async fn test_cleanup_old_logs() {
        let temp = tempfile::tempdir().unwrap();
        let old = temp.path().join("pms.log.2000-01-01");
        let today = temp
            .path()
            .join(format!("pms.log.{}", Utc::now().format("%Y-%m-%d")));
        let unrelated = temp.path().join("other.log.2000-01-01");
        for path in [&old, &today, &unrelated] {
            std::fs::write(path, b"x").unwrap();
        }

        let deleted = cleanup_old_logs(temp.path(), LOG_RETENTION_DAYS).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(!old.exists());
        assert!(today.exists());
        assert!(unrelated.exists());
    }
}
