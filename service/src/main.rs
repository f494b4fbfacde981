//! Earnzy Ledger Service Binary
//!
//! Reads one JSON request per line from stdin and writes one JSON response
//! per line to stdout, in request order. Logs go to stderr.

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use earnzy_service::{serve, LedgerService, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServiceConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    info!("Starting Earnzy ledger service");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let service = LedgerService::new(config);
    service.start();

    tokio::select! {
        served = serve(&service, tokio::io::stdin(), tokio::io::stdout()) => {
            let answered = served?;
            info!(answered, "Input closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    service.stop().await;

    let metrics = service.metrics().snapshot();
    info!(
        requests = metrics.requests_total,
        succeeded = metrics.requests_success,
        rejected = metrics.requests_rejected,
        failed = metrics.requests_failed,
        "Ledger service shutdown complete"
    );
    Ok(())
}
