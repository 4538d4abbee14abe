use anyhow::{Context, Result};
use statesync::config::SyncConfig;
use statesync::host::Host;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statesync=info".into()),
        )
        .init();

    info!("State-sync hub starting...");

    let config = SyncConfig::from_env().context("Failed to load configuration")?;
    info!(
        bind_addr = %config.server.bind_addr,
        route = %config.server.route,
        outbox_capacity = config.hub.outbox_capacity,
        drain_timeout_ms = config.hub.drain_timeout_ms,
        "Configuration loaded"
    );

    let host = Host::bind(config).await?;

    host.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl_c signal");
        }
    })
    .await?;

    info!("State-sync hub stopped");
    Ok(())
}
