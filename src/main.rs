//! # pubsub-gateway
//!
//! HTTP gateway over the in-process broker.
//!
//! ```text
//! client ───► HTTP (8080) ───► Gateway ───► InMemoryBroker
//!                                  │
//!                                  ▼
//!                         push listeners (tokio tasks)
//! ```

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use pubsub_gateway::broker::InMemoryBroker;
use pubsub_gateway::config::GatewayConfig;
use pubsub_gateway::gateway::{self, Gateway};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting pubsub gateway...");

    let config = GatewayConfig::load()?;
    let addr = config.http_addr().await?;
    info!(
        %addr,
        project = %config.project_id,
        ack_timeout_ms = config.ack_timeout_ms,
        "Configuration loaded"
    );

    let broker = InMemoryBroker::with_settings(config.broker_settings());
    let gateway = Arc::new(Gateway::from_broker(broker).with_ack_timeout(config.ack_timeout()));

    gateway::serve(gateway.clone(), addr, shutdown_signal()).await?;

    let stopped = gateway.shutdown().await;
    info!(listeners = stopped.len(), "Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
