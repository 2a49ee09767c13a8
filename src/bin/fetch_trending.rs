#![forbid(unsafe_code)]

//! One-shot ingestion pass, meant for cron. Pulls the configured region's
//! trending chart into the same database the backend reads.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use trendboard::{
    config::{AppConfig, ConfigOverrides, resolve_app_config},
    ingest::{self, IngestReport},
    logging::init_tracing,
    storage::VideoStore,
    youtube::{VideoPlatform, YouTubeClient},
};

#[derive(Debug, Parser)]
#[command(name = "fetch_trending", about = "Store the current trending chart")]
struct FetchArgs {
    #[arg(long)]
    db_path: Option<PathBuf>,
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Drop every stored video before fetching.
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = FetchArgs::parse();
    let reset = args.reset;
    let config = resolve_app_config(ConfigOverrides {
        db_path: args.db_path,
        env_path: args.env_file,
        ..ConfigOverrides::default()
    })?;
    init_tracing(&config.log_level)?;

    if config.api_key_is_placeholder() {
        warn!("YOUTUBE_API_KEY is not set; the request will most likely be rejected");
    }

    let platform: Arc<dyn VideoPlatform> = Arc::new(YouTubeClient::new(config.api_key.clone()));
    let report = run(&config, platform, reset).await?;
    println!(
        "Inserted {} new videos ({} already stored) into {}",
        report.inserted,
        report.skipped,
        config.db_path.display()
    );
    Ok(())
}

async fn run(
    config: &AppConfig,
    platform: Arc<dyn VideoPlatform>,
    reset: bool,
) -> Result<IngestReport> {
    let store = VideoStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let conn = store.connect().await?;

    if reset {
        conn.reset().await?;
        info!("video store reset before ingestion");
    }

    ingest::fetch_trending(&conn, platform, config).await
}
