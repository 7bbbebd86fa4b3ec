//! Courier navigation - proximity alerts and route sequencing for delivery stops
//!
//! Reads position fixes and commands as newline-delimited JSON on stdin,
//! raises one alert per stop when the courier comes within range, and keeps
//! a greedy visiting order over the remaining stops.
//!
//! Module structure:
//! - `domain/` - Core types (Coordinate, Stop, Route, input events)
//! - `io/` - External interfaces (location input, stop directory, egress, Prometheus)
//! - `services/` - Business logic (proximity, sequencing, session, tracker)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use courier_nav::infra::{Config, Metrics};
use courier_nav::io::{start_location_source, MemoryDirectory};
use courier_nav::services::Tracker;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Courier navigation - delivery stop proximity alerts and routing
#[derive(Parser, Debug)]
#[command(name = "courier-nav", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Override the stops file from the configuration
    #[arg(short, long)]
    stops: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for nearest-stop and throttling detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr; stdin carries the input stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "courier-nav starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);
    let stops_file = args.stops.unwrap_or_else(|| config.stops_file().to_string());

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        threshold_m = %config.threshold_m(),
        min_distance_m = %config.min_distance_m(),
        min_interval_ms = %config.min_interval_ms(),
        replan_on_fix = %config.replan_on_fix(),
        replan_distance_m = %config.replan_distance_m(),
        stops_file = %stops_file,
        egress_file = %config.egress_file(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // A broken stops file is fatal; there is nothing to navigate to
    let directory = MemoryDirectory::from_file(&stops_file)?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Create event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(config.channel_capacity());

    // Start location source on stdin
    let source_config = config.clone();
    let source_metrics = metrics.clone();
    let source_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let reader = BufReader::new(tokio::io::stdin());
        if let Err(e) =
            start_location_source(reader, &source_config, event_tx, source_metrics, source_shutdown).await
        {
            error!(error = %e, "location_source_error");
        }
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = courier_nav::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run tracker - consumes events until the input ends or shutdown
    let mut tracker = Tracker::new(config, directory, metrics.clone());
    tracker.run(event_rx).await;

    metrics.report().log();
    info!("courier-nav shutdown complete");

    // A pending blocking stdin read would otherwise keep the runtime alive
    std::process::exit(0)
}
