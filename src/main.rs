//! Main entry point for the chart-harvester CLI

use anyhow::Context;
use chart_harvester::cli::{Cli, Commands};
use chart_harvester::metrics;
use chart_harvester::shutdown::{self, ShutdownCoordinator, ShutdownReason};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    // Check if JSON output is requested via environment variable
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chart_harvester=info"));

    // Logs go to stderr so JSON reports on stdout stay machine-readable
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(addr) = cli.metrics_addr {
        metrics::init_metrics(addr)
            .await
            .with_context(|| format!("Failed to start metrics exporter on {addr}"))?;
    }

    // Install global shutdown coordinator and Ctrl+C handler
    let shutdown = ShutdownCoordinator::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing in-flight tasks and flushing results...");
                shutdown.request(ShutdownReason::Interrupt);
            }
        }
    });

    let catalog = cli.load_catalog()?;
    match &cli.command {
        Commands::Charts(args) => args.execute(&cli, &catalog, shutdown).await?,
        Commands::Sitemap(args) => args.execute(&cli, &catalog, shutdown).await?,
        Commands::Stress(args) => args.execute(&cli, &catalog, shutdown).await?,
        Commands::Compare(args) => args.execute(cli.output_format)?,
        Commands::Sources(cmd) => cmd.execute(&catalog, cli.output_format)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
