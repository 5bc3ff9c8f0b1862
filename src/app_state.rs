//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::domain::{ConnectionRegistry, MessageBus};
use crate::error::ChatError;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Validated server configuration.
    pub config: Arc<ServerConfig>,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Bus every received data frame is published on.
    pub messages: MessageBus,
    /// Root token; cancelled once when the server stops.
    pub shutdown: CancellationToken,
    /// Tracks running read loops so shutdown can wait for them.
    pub tracker: TaskTracker,
    /// Admission bound; `None` when `max_connections` is unset.
    pub admission: Option<Arc<Semaphore>>,
}

impl AppState {
    /// Builds fresh state for a configuration that already passed
    /// [`ServerConfig::validate`].
    #[must_use]
    pub(crate) fn new(config: ServerConfig) -> Self {
        let admission = config
            .max_connections
            .map(|max| Arc::new(Semaphore::new(max)));
        Self {
            messages: MessageBus::new(config.message_bus_capacity),
            config: Arc::new(config),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            admission,
        }
    }

    /// Decides whether one more connection may be accepted.
    ///
    /// Returns the permit to hold for the connection's lifetime, or `None`
    /// when admission is unbounded.
    ///
    /// # Errors
    ///
    /// - [`ChatError::ServerStopping`] once shutdown has begun.
    /// - [`ChatError::TooManyConnections`] when every permit is taken.
    pub fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, ChatError> {
        if self.shutdown.is_cancelled() {
            return Err(ChatError::ServerStopping);
        }
        match &self.admission {
            Some(semaphore) => Arc::clone(semaphore)
                .try_acquire_owned()
                .map(Some)
                .map_err(|_| ChatError::TooManyConnections),
            None => Ok(None),
        }
    }
}
