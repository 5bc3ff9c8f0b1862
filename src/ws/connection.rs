//! WebSocket connection state machine.
//!
//! Drains inbound frames for a single WebSocket connection until the peer
//! closes, the transport fails, or the connection is cancelled. Data frames
//! are logged and published on the [`MessageBus`]; nothing is echoed.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures_util::SinkExt;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::domain::{ChatMessage, ConnectionHandle, ConnectionId, MessageBody, MessageBus};

/// One accepted socket and what its read loop needs.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    socket: WebSocket,
    cancel: CancellationToken,
    messages: MessageBus,
}

impl Connection {
    /// Wraps an upgraded socket.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        socket: WebSocket,
        cancel: CancellationToken,
        messages: MessageBus,
    ) -> Self {
        Self {
            id,
            socket,
            cancel,
            messages,
        }
    }

    /// Runs the read loop to completion, then closes the socket.
    ///
    /// Consumes the connection, so the socket is released exactly once.
    pub async fn run(mut self) {
        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => None,
                frame = self.socket.recv() => Some(frame),
            };

            let Some(frame) = next else {
                tracing::debug!(conn = %self.id, "connection cancelled");
                let goodbye = Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: Utf8Bytes::from_static("server shutting down"),
                }));
                if let Err(error) = self.socket.send(goodbye).await {
                    tracing::debug!(conn = %self.id, %error, "failed to send close frame");
                }
                break;
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    self.receive(MessageBody::Text(text.as_str().to_owned())).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    self.receive(MessageBody::Binary(bytes.to_vec())).await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    tracing::trace!(conn = %self.id, "control frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(
                        conn = %self.id,
                        code = frame.as_ref().map(|f| f.code),
                        "peer sent close frame"
                    );
                    break;
                }
                Some(Err(error)) => {
                    tracing::warn!(conn = %self.id, %error, "error reading frame");
                    break;
                }
                None => {
                    tracing::debug!(conn = %self.id, "stream ended");
                    break;
                }
            }
        }

        // Flushes a pending close reply before the socket is dropped.
        if let Err(error) = SinkExt::close(&mut self.socket).await {
            tracing::debug!(conn = %self.id, %error, "error closing socket");
        }
    }

    async fn receive(&mut self, body: MessageBody) {
        tracing::info!(
            conn = %self.id,
            kind = body.kind(),
            body = %body,
            "received"
        );
        self.messages.publish(ChatMessage::new(self.id, body)).await;
    }
}

/// Takes ownership of an upgraded socket and starts its read loop.
///
/// Registers the connection, spawns the loop as a tracked task and returns
/// the handle right away. When the loop exits `permit` (if any) is
/// released and the connection leaves the registry.
pub async fn handle_connection(
    state: &AppState,
    socket: WebSocket,
    permit: Option<OwnedSemaphorePermit>,
) -> ConnectionHandle {
    let handle = ConnectionHandle::new(ConnectionId::new(), state.shutdown.child_token());
    state.registry.register(handle.clone()).await;
    tracing::info!(conn = %handle.id, "connection opened");

    let connection = Connection::new(
        handle.id,
        socket,
        handle.token().clone(),
        state.messages.clone(),
    );
    let registry = Arc::clone(&state.registry);
    let id = handle.id;
    state.tracker.spawn(async move {
        connection.run().await;
        drop(permit);
        registry.remove(id).await;
        tracing::info!(conn = %id, "connection closed");
    });

    handle
}
