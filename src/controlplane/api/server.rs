//! API Server
//!
//! Hosts the REST front door for the orchestrator with graceful shutdown.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use super::rest::RestRouter;
use crate::controlplane::Orchestrator;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: "0.0.0.0:8090".parse().unwrap(),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST API server for the orchestrator
pub struct ApiServer {
    config: ApiServerConfig,
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, orchestrator: Arc<Orchestrator>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            orchestrator,
            shutdown_tx,
        }
    }

    /// Run the API server until shutdown is requested
    pub async fn run(&self) -> Result<()> {
        let router = RestRouter::new(self.orchestrator.clone());
        let app = router.build();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!("REST API listening on {}", self.config.rest_addr);

        let listener = tokio::net::TcpListener::bind(self.config.rest_addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("REST server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
