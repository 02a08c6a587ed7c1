//! Rampart gateway binary.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use rampart::config::{load_config, GatewayConfig};
use rampart::http::{shutdown_signal, GatewayServer};
use rampart::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "rampart")]
#[command(about = "Rate-limiting reverse proxy", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_tracing(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rampart starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        targets = config.upstream.targets.len(),
        rate_limit = config.rate_limit.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );
    if config.upstream.targets.is_empty() {
        tracing::warn!("No upstream targets configured; every request answers 503");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = GatewayServer::new(&config)?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    server.run(listener, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
