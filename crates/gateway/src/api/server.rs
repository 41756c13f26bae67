use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use super::routes::create_router;
use super::types::AppState;
use crate::config::GatewayConfig;

pub async fn start_server(config: GatewayConfig, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let bind = config.bind;
    info!(api_base = %config.api_base, "proxying to backend");

    let app = create_router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Augustus gateway listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_rx))
        .await?;

    Ok(())
}

async fn shutdown_signal(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
    info!("Shutting down gateway...");
}
