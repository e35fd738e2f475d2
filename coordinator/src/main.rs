//! FxQuote Refresher Binary
//!
//! Runs the refresh service against PostgreSQL and a vatcomply-compatible
//! rates API until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxquote_coordinator::config::log_filter_from_env;
use fxquote_coordinator::{RefreshService, ServiceConfig, SupportedPairs};
use fxquote_fx::HttpRateFetcher;
use fxquote_store::PgQuoteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_filter_from_env()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting FxQuote refresher");

    // Load configuration
    let config = ServiceConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store = PgQuoteStore::connect_with_retry(
        &config.database.url,
        config.database.max_connections,
        config.database.connect_attempts,
        config.database.connect_retry_delay,
    )
    .await
    .context("connecting to the quote database")?;
    store
        .ensure_schema()
        .await
        .context("creating the quote schema")?;

    let fetcher = HttpRateFetcher::new(&config.fetcher.base_url, config.worker.fetch_timeout)
        .context("building the rates HTTP client")?;

    let supported = match &config.supported_pairs_path {
        Some(path) => Some(SupportedPairs::load(path)?),
        None => None,
    };

    let mut service = RefreshService::new(config.clone(), Arc::new(store), Arc::new(fetcher));
    if let Some(pairs) = supported {
        service = service.with_supported_pairs(pairs);
    }

    service.start().await?;
    info!(
        rates_base_url = %config.fetcher.base_url,
        "Refresher running"
    );

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received");

    let report = service.shutdown().await;
    if report.worker_panics > 0 {
        error!(worker_panics = report.worker_panics, "Workers panicked during the run");
    }

    info!(metrics = %service.metrics().to_prometheus(), "Final metrics");
    info!("Refresher shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
