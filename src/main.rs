//! Main entry point for the ioda-pipeline CLI

use clap::Parser;
use ioda_pipeline::cli::{Cli, Commands};
use ioda_pipeline::metrics::init_metrics;
use ioda_pipeline::shutdown::{spawn_ctrl_c_handler, ShutdownCoordinator};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ioda_pipeline=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = init_metrics(addr).await {
            warn!("Metrics exporter disabled: {}", e);
        }
    }

    let shutdown = ShutdownCoordinator::shared();
    spawn_ctrl_c_handler(shutdown.clone());

    let result = match cli.command {
        Commands::Discover(ref args) => args.execute(&cli).await.map_err(|e| anyhow::anyhow!(e)),
        Commands::Fetch(ref args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::BuildPanel(ref args) => args.execute(&cli).map_err(|e| anyhow::anyhow!(e)),
        Commands::Qa(ref args) => args.execute(&cli).map_err(|e| anyhow::anyhow!(e)),
        Commands::Closeout(ref args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
