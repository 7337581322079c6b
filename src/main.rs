use anyhow::Context;
use database::Database;
use feed_client::BlueskyClient;
use skyfeed_core::{AppConfig, ErrorExt};
use std::path::PathBuf;
use std::sync::Arc;
use streaming_service::{wait_for_termination, StreamSettings, StreamingService};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "skyfeed=info,streaming_service=info,feed_client=info,database=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Skyfeed - Bluesky feed streaming");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).map_err(|e| {
        tracing::error!("{}", e.user_friendly_message());
        e
    })?;
    tracing::debug!("Loaded configuration: {:?}", config.redacted());

    let database = Database::open(&config.database.path)
        .await
        .with_context(|| format!("failed to open database at {}", config.database.path))?;
    tracing::info!("Database ready at {}", config.database.path);

    let client = BlueskyClient::new(&config.bluesky).context("failed to build Bluesky client")?;
    tracing::info!(
        "Streaming timeline of {} from {}",
        config.bluesky.handle,
        client.service_url()
    );

    let service = StreamingService::new(
        Arc::new(client),
        Arc::new(database),
        StreamSettings::from(&config.streaming),
    );

    if let Err(e) = service.start().await {
        tracing::error!("{}", e.user_friendly_message());
        return Err(e).context("streaming service failed to start");
    }

    let signal = wait_for_termination()
        .await
        .context("failed to listen for termination signals")?;
    tracing::info!("{} received, finishing current poll", signal);

    service.stop().await;
    tracing::info!("Skyfeed shut down cleanly");
    Ok(())
}
