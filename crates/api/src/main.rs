//! Blinkwatch - Main Entry Point
//!
//! Usage: `blinkwatch [CONFIG_FILE]` (default `blinkwatch.toml`).

use api::{init_logging, run_server, AppConfig, CONFIG_FILE};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_FILE.to_string());
    let config = AppConfig::load(&path)?;
    init_logging(&config.logging)?;

    info!("=== Blinkwatch v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", path);

    let metrics = PrometheusBuilder::new().install_recorder()?;
    run_server(config, Some(metrics)).await
}
