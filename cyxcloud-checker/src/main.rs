//! CyxCloud Repair Checker service
//!
//! Continuously scans segment metadata, classifies remote-segment
//! health against erasure-coded piece placement, and enqueues
//! segments needing repair.

use std::sync::Arc;

use clap::Parser;
use cyxcloud_checker::{
    CheckerConfig, CheckerMetrics, OverrideMap, PostgresOverlayClient, PostgresRepairQueue,
    PostgresSegmentSource, ReliabilityCache, ReliabilityCacheConfig, ScanDriver,
};
use cyxcloud_checker::metrics::MetricsServer;
use cyxcloud_checker::orchestrator::Orchestrator;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "cyxcloud-checker")]
#[command(about = "CyxCloud erasure-coded segment repair checker")]
struct Cli {
    /// PostgreSQL database URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Interval between scan iterations, in seconds.
    #[arg(long, default_value = "1800")]
    iteration_interval_secs: u64,

    /// Number of Partial tasks forked per iteration. Defaults to
    /// twice the available CPUs when unset.
    #[arg(long)]
    num_partials: Option<usize>,

    /// Segments pulled per batch by each Partial.
    #[arg(long, default_value = "500")]
    segment_batch_size: usize,

    /// Injured-segment insert buffer batch size.
    #[arg(long, default_value = "100")]
    insert_batch_size: usize,

    /// Comma-separated `k-value` repair threshold overrides.
    #[arg(long, default_value = "")]
    repair_threshold_overrides: String,

    /// Comma-separated `k-value` repair target overrides.
    #[arg(long, default_value = "")]
    repair_target_overrides: String,

    /// Comma-separated excluded country codes.
    #[arg(long, default_value = "")]
    excluded_countries: String,

    /// Dry run mode: classify and log but never enqueue repairs.
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Run exactly one iteration and exit.
    #[arg(long, default_value = "false")]
    one_shot: bool,

    /// Metrics port for the health/metrics HTTP endpoint.
    #[arg(long, default_value = "9091")]
    metrics_port: u16,
}

impl Cli {
    fn into_config(self) -> Result<CheckerConfig, cyxcloud_checker::error::CheckerError> {
        let defaults = CheckerConfig::default();
        Ok(CheckerConfig {
            database_url: self.database_url,
            iteration_interval_secs: self.iteration_interval_secs,
            num_partials: self.num_partials,
            segment_batch_size: self.segment_batch_size,
            insert_batch_size: self.insert_batch_size,
            repair_threshold_overrides: self.repair_threshold_overrides,
            repair_target_overrides: self.repair_target_overrides,
            excluded_countries: self
                .excluded_countries
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            dry_run: self.dry_run,
            one_shot: self.one_shot,
            metrics_port: self.metrics_port,
            ..defaults
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!(
        iteration_interval_secs = cli.iteration_interval_secs,
        num_partials = ?cli.num_partials,
        dry_run = cli.dry_run,
        one_shot = cli.one_shot,
        "starting cyxcloud-checker"
    );

    let config = cli.into_config()?;

    let db_config = cyxcloud_metadata::postgres::DbConfig {
        url: config.database_url.clone(),
        ..Default::default()
    };
    let db = Arc::new(
        cyxcloud_metadata::postgres::Database::new(db_config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to database: {e}"))?,
    );

    let overrides = Arc::new(
        OverrideMap::new()
            .with_threshold_overrides(&config.repair_threshold_overrides)
            .map_err(|e| anyhow::anyhow!("invalid repair threshold overrides: {e}"))?
            .with_target_overrides(&config.repair_target_overrides)
            .map_err(|e| anyhow::anyhow!("invalid repair target overrides: {e}"))?,
    );

    let overlay = Arc::new(PostgresOverlayClient::new(db.clone()));
    let reliability = Arc::new(ReliabilityCache::new(
        overlay,
        ReliabilityCacheConfig {
            staleness: config.cache_staleness(),
            online_window: config.online_window(),
        },
    ));

    let segment_source = Arc::new(PostgresSegmentSource::new(db.pool().clone()));
    let repair_queue = Arc::new(PostgresRepairQueue::new(db.pool().clone()));

    let metrics = CheckerMetrics::new();
    let cancellation = CancellationToken::new();

    let driver = ScanDriver::new(
        segment_source,
        reliability,
        repair_queue,
        overrides,
        config.clone(),
        metrics.clone(),
        cancellation.clone(),
    );

    let metrics_server_cancellation = cancellation.clone();
    let metrics_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    tokio::spawn(async move {
        let server = MetricsServer::install(metrics_addr);
        tokio::select! {
            result = server.run() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "metrics server exited");
                }
            }
            _ = metrics_server_cancellation.cancelled() => {}
        }
    });

    let mut orchestrator = Orchestrator::new(driver, config.iteration_interval(), cancellation.clone());

    if config.one_shot {
        orchestrator.run_once().await?;
        return Ok(());
    }

    let shutdown_cancellation = cancellation.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown_cancellation.cancel();
        }
    });

    orchestrator.run().await?;
    info!("cyxcloud-checker stopped");

    Ok(())
}
