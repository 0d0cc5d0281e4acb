use mockgps_daemon::config;
use mockgps_daemon::module::location::InMemoryLocationManager;
use mockgps_daemon::MockGpsDaemon;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;

use mockgps_common::proto::mock_location_server::MockLocationServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::read_config()?;

    // Initialize logging
    let _logging_guard = mockgps_daemon::logging::init_logging(
        &config.log_dir,
        "mockgps-daemon",
        &config.log_level,
    );

    tracing::info!("MockGPS daemon starting...");
    tracing::info!("Server will listen on {}", config.server_address());

    if !config.mock_location_allowed {
        tracing::warn!("Mock location capability not granted, set commands will fail provider registration");
    }

    let subsystem = Arc::new(InMemoryLocationManager::new(config.mock_location_allowed));
    let daemon = MockGpsDaemon::new(config, subsystem);

    let server_addr: SocketAddr = config
        .server_address()
        .parse()
        .with_context(|| format!("Invalid server address {}", config.server_address()))?;

    tracing::info!(
        "gRPC server starting on {} (pulse interval {} ms)",
        server_addr,
        config.pulse_interval_ms
    );

    Server::builder()
        .add_service(MockLocationServer::new(daemon.service()))
        .serve_with_shutdown(server_addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received.");
        })
        .await?;

    daemon.shutdown().await;
    Ok(())
}
