use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use remote_app::{load_config, LoggingImportListener, Node, DEFAULT_CONFIG_FILE};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = load_config(&config_path)?;

    tracing::info!("remote node starting...");
    tracing::info!("config     = {}", config_path.display());
    tracing::info!("listen     = {}", config.listen);
    tracing::info!("multicast  = {}:{}", config.multicast_group, config.multicast_port);
    tracing::info!("servlet    = {}", config.servlet_path);

    let listen = config.listen_addr()?;
    let node = Node::build(config)?;
    tracing::info!("framework  = {}", node.framework_uid());

    node.registry.add_listener(Arc::new(LoggingImportListener));

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("bind HTTP listener on {listen}"))?;

    node.discovery
        .start()
        .await
        .context("start multicast discovery")?;
    let tasks = node.spawn_maintenance();

    tracing::info!("servlet listening on {listen}");
    axum::serve(
        listener,
        node.router()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await
    .context("HTTP server")?;

    for task in tasks {
        task.abort();
    }
    node.discovery.stop();
    tracing::info!("remote node stopped");
    Ok(())
}
