//! Chat server lifecycle.
//!
//! [`ChatServer`] owns the listener configuration and the shared
//! [`AppState`]. It is cheap to clone: one clone typically drives
//! [`ChatServer::run`] on a background task while another calls
//! [`ChatServer::stop`].
//!
//! ```text
//! new ──► bind ──► serve ─────────────► (returns after stop)
//!                    │  GET {path}  ──► ws_handler ──► handle_connection
//!                    │  GET /health
//! stop ──► cancel shutdown token ──► close bus ──► wait for read loops
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::ws::WebSocket;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::OwnedSemaphorePermit;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::ServerConfig;
use crate::domain::{ConnectionHandle, ConnectionId, MessageBus};
use crate::error::ChatError;
use crate::ws::{handle_connection, ws_handler};

/// WebSocket chat server.
#[derive(Debug, Clone)]
pub struct ChatServer {
    state: AppState,
    stopped: Arc<AtomicBool>,
}

impl ChatServer {
    /// Creates an idle server. No socket is bound until
    /// [`ChatServer::bind`] or [`ChatServer::run`].
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] if the configuration does not validate
    /// (for example an empty path).
    pub fn new(config: ServerConfig) -> Result<Self, ChatError> {
        config.validate()?;
        Ok(Self {
            state: AppState::new(config),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Bus on which every received data frame is published.
    #[must_use]
    pub fn messages(&self) -> &MessageBus {
        &self.state.messages
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.state.registry.len().await
    }

    /// Ids of the open connections.
    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.state.registry.ids().await
    }

    /// Returns `true` once [`ChatServer::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Builds the HTTP router: the upgrade handler on the configured path
    /// plus the system routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.state.config.path, get(ws_handler))
            .merge(api::build_router())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Binds the TCP listener on the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Bind`] if the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, ChatError> {
        let addr = self.state.config.listen_addr();
        TcpListener::bind(addr)
            .await
            .map_err(|source| ChatError::Bind { addr, source })
    }

    /// Serves HTTP on `listener` until [`ChatServer::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Serve`] if the listener fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ChatError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, path = %self.state.config.path, "listening");
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(self.state.shutdown.clone().cancelled_owned())
            .await
            .map_err(ChatError::Serve)?;

        tracing::debug!("listener shut down");
        Ok(())
    }

    /// Binds and serves; blocks until [`ChatServer::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Bind`] or [`ChatError::Serve`].
    pub async fn run(&self) -> Result<(), ChatError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Takes ownership of an upgraded socket and starts its read loop.
    ///
    /// Returns immediately with the connection's handle; the server keeps
    /// its own copy in the registry until the loop exits.
    pub async fn handle_connection(
        &self,
        socket: WebSocket,
        permit: Option<OwnedSemaphorePermit>,
    ) -> ConnectionHandle {
        handle_connection(&self.state, socket, permit).await
    }

    /// Cancels one open connection. Returns `false` if it is not open.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        match self.state.registry.get(id).await {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Stops the server.
    ///
    /// The first call stops accepting connections, shuts the listener down
    /// gracefully, cancels every open connection, closes the message bus and
    /// waits up to `drain_timeout` for all read loops to exit. Later calls
    /// (including ones made while the first is still draining) skip the
    /// teardown and wait for the same drain, so they return `Ok(())` only once
    /// every read loop has exited.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::DrainTimeout`] if connections are still open
    /// when the timeout elapses.
    pub async fn stop(&self) -> Result<(), ChatError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("server already stopping; waiting for drain");
            return self.drain().await;
        }

        self.state.shutdown.cancel();
        let open = self.state.registry.cancel_all().await;
        tracing::info!(open, "stopping server");

        self.state.messages.close().await;
        self.state.tracker.close();

        self.drain().await?;
        tracing::info!("server stopped");
        Ok(())
    }

    /// Waits up to `drain_timeout` for every tracked read loop to exit.
    async fn drain(&self) -> Result<(), ChatError> {
        let drained =
            tokio::time::timeout(self.state.config.drain_timeout, self.state.tracker.wait()).await;
        if drained.is_err() {
            let remaining = self.state.registry.len().await;
            tracing::warn!(remaining, "connections still open after drain timeout");
            return Err(ChatError::DrainTimeout { remaining });
        }
        Ok(())
    }
}
