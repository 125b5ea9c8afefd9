use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skyq_epg::{
    catalog::ChannelCatalog,
    config::Config,
    ingestor::{
        BackgroundExecutor, DeviceIngestor, EpgIngestor, RefreshCoordinator,
        RefreshStateManager, RemoteDocumentFetcher,
    },
    models::ListingSource,
    sources::DeviceClient,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "skyq-epg")]
#[command(version)]
#[command(about = "Aggregates Sky Q channel data with remote XMLTV listings")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (defaults to $CONFIG_FILE or config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Sky Q box address (overrides config file)
    #[arg(short = 'd', long, value_name = "HOST")]
    device_host: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = if cli.log_level == "trace" {
        format!("skyq_epg={},tower_http=trace", cli.log_level)
    } else {
        format!("skyq_epg={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting skyq-epg v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(device_host) = cli.device_host {
        config.device.host = device_host;
    }
    config.validate()?;

    let catalog = Arc::new(ChannelCatalog::new());
    if config.storage.snapshot_path.exists() {
        match catalog.load_snapshot(&config.storage.snapshot_path).await {
            Ok(count) => info!("Restored {} channels from snapshot", count),
            Err(e) => warn!("Ignoring unreadable catalog snapshot: {}", e),
        }
    }

    if config.device.host.is_empty() {
        info!("No device host configured, skipping device channel load");
    } else {
        let client = DeviceClient::new(
            &config.device.host,
            config.device.rest_port,
            config.device.request_timeout,
            &config.fetch.user_agent,
        )?;
        let loader = DeviceIngestor::new(client, Arc::clone(&catalog))
            .with_detail_concurrency(config.device.detail_concurrency);
        match loader.load_channels().await {
            Ok(report) => info!(
                "Device load: {} services, {} details ({} failed)",
                report.summaries, report.details_loaded, report.details_failed
            ),
            Err(e) => warn!("Device channel load failed, continuing with listings only: {}", e),
        }
    }

    let executor = BackgroundExecutor::new();
    let fetcher = Arc::new(RemoteDocumentFetcher::new(
        config.fetch.to_options(),
        executor.abort_token(),
    )?);
    let ingestor = EpgIngestor::new(fetcher, Arc::clone(&catalog), RefreshStateManager::new());
    let coordinator = Arc::new(RefreshCoordinator::new(ingestor, executor.clone()));

    let mut events = coordinator.subscribe();
    let stop_events = executor.shutdown_token();
    executor.spawn(async move {
        loop {
            tokio::select! {
                _ = stop_events.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => debug!(
                        "Refresh {} {:?}/{:?}: {}",
                        event.listing_url, event.phase, event.step, event.message
                    ),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Refresh event log lagged by {} events", n)
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });

    for listing_config in &config.listings {
        let mut listing = ListingSource::new(&listing_config.url, config.storage.listing_dir.clone())?;
        if let Some(base) = listing_config.icon_base_url.as_deref() {
            listing = listing.with_icon_base_url(base)?;
        }
        coordinator
            .add_schedule(
                Arc::new(listing),
                &listing_config.update_cron,
                listing_config.run_now,
            )
            .await?;
    }
    info!("Registered {} listing schedules", config.listings.len());

    let web_shutdown = CancellationToken::new();
    let web_task = if config.web.enabled {
        let state = AppState {
            catalog: Arc::clone(&catalog),
            coordinator: Arc::clone(&coordinator),
            listing_dir: config.storage.listing_dir.clone(),
            default_cron: skyq_epg::config::defaults::DEFAULT_UPDATE_CRON.to_string(),
        };
        let server = WebServer::new(&config.web, state)?;
        Some(tokio::spawn(server.serve_with_cancellation(web_shutdown.clone())))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    web_shutdown.cancel();
    if let Some(task) = web_task {
        match task.await {
            Ok(Err(e)) => warn!("Web server error: {}", e),
            Err(e) => warn!("Web server task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    if !coordinator.shutdown(config.runtime.shutdown_grace).await {
        warn!("Some refresh cycles were aborted after the grace period");
    }

    match catalog.save_snapshot(&config.storage.snapshot_path).await {
        Ok(count) => info!(
            "Saved {} channels to {}",
            count,
            config.storage.snapshot_path.display()
        ),
        Err(e) => warn!("Failed to save catalog snapshot: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}
