//! ood-metrics - OnDemand portal metrics harness
//!
//! Polls the metrics provider at a fixed interval and prints every value,
//! optionally serving the same values to Prometheus.

use anyhow::Result;
use clap::Parser;
use ood_metrics::{api, cli::Cli, harness, logging};
use ood_metrics_lib::{config::ProviderConfig, HealthRegistry, MetricsProvider, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const PROVIDER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log, cli.log_level.into(), &cli.log_facility, cli.json)?;

    // Load configuration
    let mut config = ProviderConfig::load()?;
    if let Some(secs) = cli.min_poll_seconds {
        config.min_poll_seconds = secs.max(1);
    }
    info!(host = %config.self_fqdn, min_poll_seconds = config.min_poll_seconds, "Provider configured");

    let health_registry = HealthRegistry::with_refresh_components().await;
    let logger = StructuredLogger::new(&config.self_fqdn);
    let provider = Arc::new(MetricsProvider::from_config(
        &config,
        logger.clone(),
        health_registry,
    )?);
    logger.log_startup(PROVIDER_VERSION, config.min_poll_seconds);

    if let Some(port) = cli.serve {
        let state = Arc::new(api::AppState::new(provider.clone()));
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state).await {
                error!(error = %e, "API server stopped");
            }
        });
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    harness::run(
        &provider,
        &mut std::io::stdout(),
        Duration::from_secs(config.print_interval_secs),
        cli.once,
        shutdown,
    )
    .await?;

    logger.log_shutdown(if cli.once { "single round completed" } else { "SIGINT received" });
    Ok(())
}
