//! Broadcast channel for received chat messages.
//!
//! [`MessageBus`] wraps a [`tokio::sync::broadcast`] channel. Every data
//! frame read by a connection is published as a [`ChatMessage`]. Nothing is
//! ever forwarded back to clients; the bus exists so in-process observers
//! (tests, future consumers) can see what arrived.
//!
//! Unlike a bare sender, the bus can be closed: the server closes it exactly
//! once during shutdown, after which publishing is a no-op and existing
//! receivers see [`broadcast::error::RecvError::Closed`] once drained.

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};

use super::ChatMessage;

/// Closable broadcast bus for [`ChatMessage`]s.
#[derive(Debug, Clone)]
pub struct MessageBus {
    sender: Arc<RwLock<Option<broadcast::Sender<ChatMessage>>>>,
}

impl MessageBus {
    /// Creates a new open bus with the given ring buffer capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or above `usize::MAX / 2`.
    /// [`crate::config::ServerConfig::validate`] rejects both (and anything
    /// above [`crate::config::MAX_MESSAGE_BUS_CAPACITY`]) before a server
    /// builds its bus.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(RwLock::new(Some(sender))),
        }
    }

    /// Publishes a message to all subscribers.
    ///
    /// Returns the number of receivers that got the message; 0 when nobody
    /// is listening or the bus is closed.
    pub async fn publish(&self, message: ChatMessage) -> usize {
        match self.sender.read().await.as_ref() {
            Some(sender) => sender.send(message).unwrap_or(0),
            None => 0,
        }
    }

    /// Creates a receiver for all future messages, or `None` once closed.
    pub async fn subscribe(&self) -> Option<broadcast::Receiver<ChatMessage>> {
        self.sender.read().await.as_ref().map(broadcast::Sender::subscribe)
    }

    /// Closes the bus.
    ///
    /// Returns `true` for the call that actually closed it and `false` for
    /// every later call.
    pub async fn close(&self) -> bool {
        self.sender.write().await.take().is_some()
    }

    /// Returns `true` once [`MessageBus::close`] has run.
    pub async fn is_closed(&self) -> bool {
        self.sender.read().await.is_none()
    }

    /// Current number of receivers; 0 when closed.
    pub async fn receiver_count(&self) -> usize {
        self.sender
            .read()
            .await
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }
}
