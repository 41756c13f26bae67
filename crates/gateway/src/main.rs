use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};

use augustus_gateway::{GatewayConfig, api};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = GatewayConfig::from_env().context("Invalid gateway configuration")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        if let Err(e) = api::start_server(config, shutdown_rx).await {
            error!(error = %e, "gateway crashed");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal...");
    let _ = shutdown_tx.send(true);
    let _ = server.await;

    info!("Augustus gateway shutdown complete.");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
