use std::sync::Arc;

use pms::api::{ApiServer, ApiServerConfig, AppState};
use pms::config::AppConfig;
use pms::library::{LibraryManager, TrackCatalog};
use pms::logging::init_logging;
use pms::pipeline::{DownloadPipeline, FileJobStore, JobQueue, JobQueueConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();
    config.paths.ensure_directories().await?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let (logging_config, _guard) =
        init_logging(&config.paths.logs_dir, config.log_level.as_deref())?;

    tracing::info!(
        data_root = %config.data_root().display(),
        concurrency = config.job_concurrency,
        "Starting pms v{}",
        env!("CARGO_PKG_VERSION")
    );

    let catalog: Arc<dyn TrackCatalog> =
        Arc::new(LibraryManager::load(&config.paths.library_json).await);
    let store = Arc::new(FileJobStore::new(&config.paths.jobs_json));
    let pipeline = Arc::new(DownloadPipeline::from_config(&config, catalog.clone()));
    let job_queue = JobQueue::open(
        JobQueueConfig::new(config.job_concurrency),
        store,
        pipeline,
    )
    .await;

    let cancel_token = CancellationToken::new();
    logging_config.start_retention_cleanup(cancel_token.clone());

    let state = AppState::new(job_queue, catalog).with_logging_config(logging_config);
    let server = ApiServer::new(ApiServerConfig::from(&config), state)
        .with_cancel_token(cancel_token.clone());

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C, shutting down");
                cancel_token.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;

    tracing::info!("pms stopped");
    Ok(())
}
