//! onair-lightd - On-Air Light Daemon
//!
//! Main entry point: bootstraps configuration and logging, wires the camera
//! probe and bridge client together, and runs the reconcile loop until a
//! shutdown signal arrives.

use onair_lightd::config::AppConfig;
use onair_lightd::hue_client::HueClient;
use onair_lightd::scheduler::LightScheduler;
use onair_lightd::usage_probe::{self, CapabilityProbe};
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Configuration must be valid before anything else runs
    let config = AppConfig::from_env()?;

    // Initialize tracing: debug console stream plus an info+ rolling file
    std::fs::create_dir_all(&config.log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "onair-lightd.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "onair_lightd=debug".into()),
            ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(LevelFilter::INFO),
        )
        .init();

    tracing::info!("Starting onair-lightd v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bridge_ip = %config.bridge_ip,
        light_number = %config.light_number,
        capability = %config.capability,
        tick_secs = config.tick_interval.as_secs(),
        off_debounce_ticks = config.off_debounce_ticks,
        "Configuration loaded"
    );

    let ledger = usage_probe::platform_ledger()?;
    let probe = CapabilityProbe::new(ledger, config.capability.clone());

    let bridge = Arc::new(HueClient::new(
        &config.bridge_ip,
        &config.username,
        &config.light_number,
        config.appearance,
    ));

    let scheduler = Arc::new(LightScheduler::new(probe, bridge, &config));

    // Ctrl-C requests a stop; the loop exits between iterations
    let shutdown = scheduler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.stop().await;
        }
    });

    scheduler.run().await;

    Ok(())
}
