//! Earnzy Simulator
//!
//! Drives a ledger with simulated buyers, workers and an admin, then checks
//! that every coin is still accounted for.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod population;
mod scenario;

use controller::SimulationController;
use scenario::Scenario;

/// Earnzy Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Earnzy ledger workload simulator")]
struct Args {
    /// Number of simulated buyers
    #[arg(short, long, default_value = "3")]
    buyers: usize,

    /// Number of simulated workers
    #[arg(short, long, default_value = "10")]
    workers: usize,

    /// Scenario to run (built-in name or path to a .json file)
    #[arg(short, long)]
    scenario: Option<String>,

    /// Actions issued per tick in random mode
    #[arg(short, long, default_value = "8")]
    concurrency: usize,

    /// Simulation speed multiplier
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Run duration in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    duration: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.speed > 0.0, "Speed must be positive");

    let scenario = args.scenario.as_deref().map(Scenario::load).transpose()?;

    // A scenario brings its own population size
    let (buyers, workers) = match &scenario {
        Some(s) => (s.buyers, s.workers),
        None => (args.buyers, args.workers),
    };

    info!("Starting Earnzy Simulator");
    info!("Buyers: {}, workers: {}", buyers, workers);
    info!("Speed: {}x", args.speed);

    let mut controller =
        SimulationController::new(buyers, workers, args.concurrency, args.speed, args.seed);
    controller.initialize().await?;

    match scenario {
        Some(scenario) => controller.run_scenario(scenario).await?,
        None => {
            info!("Running random workload");
            info!("Press Ctrl+C to stop");

            let duration = if args.duration > 0 {
                Some(std::time::Duration::from_secs(args.duration))
            } else {
                None
            };

            controller.run(duration).await?;
        }
    }

    let metrics = controller.metrics().await;
    info!("Simulation complete");
    info!("Total operations: {}", metrics.total_operations);
    info!("Successful: {}", metrics.successful_operations);
    info!("Rejected: {}", metrics.rejected_operations);
    for (kind, count) in &metrics.successes_by_kind {
        info!("  {}: {}", kind, count);
    }
    for (code, count) in &metrics.rejections_by_code {
        info!("  rejected {}: {}", code, count);
    }
    info!(
        "Latency avg/p50/p99: {}/{}/{} µs",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );

    let report = controller.verify();
    info!(
        issued = %report.issued,
        held = %report.totals.total(),
        paid_out = %report.paid_out,
        "Conservation check"
    );

    if !report.is_consistent() {
        error!(mismatches = ?report.journal_mismatches, "Ledger inconsistent");
        anyhow::bail!("ledger failed verification");
    }

    info!("All coins accounted for");
    Ok(())
}
