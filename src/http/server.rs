//! HTTP server lifecycle.
//!
//! Binds the listener, serves the pairing routes, and supports graceful
//! shutdown. Startup failures surface as [`ServerError`]; everything after
//! bind runs in a spawned task.

use std::net::SocketAddr;

use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::error::ServerError;

/// Configuration for the pairing HTTP server.
pub struct PairingServerConfig {
    /// Address to bind the server to.
    pub addr: SocketAddr,
}

/// Serves the pairing routes until shut down.
pub struct PairingServer {
    config: PairingServerConfig,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PairingServer {
    /// Create a server for the given bind address.
    pub fn new(config: PairingServerConfig) -> Self {
        Self {
            config,
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the serve task.
    pub async fn start(&mut self, router: Router) -> Result<(), ServerError> {
        let app = router.layer(TraceLayer::new_for_http());

        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| ServerError::StartupFailed {
                reason: format!("Failed to bind to {}: {}", self.config.addr, e),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::StartupFailed {
                reason: format!("Failed to read local address: {e}"),
            })?;
        self.local_addr = Some(local_addr);

        tracing::info!("Pairing server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("Pairing server shutting down");
                })
                .await
            {
                tracing::error!("Pairing server error: {}", e);
            }
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// The bound address, once started (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the serve task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
