//! Thin WebSocket chat client.
//!
//! [`ChatClient`] dials a `ws://host:port/path` URI with default connection
//! parameters and exposes just enough to send text frames and close with a
//! proper close handshake.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ChatError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long [`ChatClient::close`] waits for the peer's close reply.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// One outbound WebSocket connection.
#[derive(Debug)]
pub struct ChatClient {
    stream: WsStream,
}

impl ChatClient {
    /// Connects to `address`, e.g. `ws://localhost:8080/chat/ws`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Dial`] if the TCP connection or the WebSocket
    /// handshake fails.
    pub async fn connect(address: &str) -> Result<Self, ChatError> {
        let (stream, response) = tokio_tungstenite::connect_async(address)
            .await
            .map_err(ChatError::Dial)?;
        tracing::debug!(%address, status = %response.status(), "connected");
        Ok(Self { stream })
    }

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Write`] if the socket is closed or broken.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), ChatError> {
        self.stream
            .send(Message::text(text.into()))
            .await
            .map_err(ChatError::Write)
    }

    /// Closes the connection.
    ///
    /// Sends a close frame on a best-effort basis (a failure there does not
    /// stop the teardown), then waits up to [`CLOSE_TIMEOUT`] for the peer to
    /// answer before releasing the socket.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Close`] if the transport fails during the handshake.
    /// - [`ChatError::Timeout`] if the peer never answers.
    pub async fn close(mut self) -> Result<(), ChatError> {
        if let Err(error) = self.stream.send(Message::Close(None)).await {
            tracing::debug!(%error, "failed to send close frame");
        }
        tracing::info!("closing connection");

        tokio::time::timeout(CLOSE_TIMEOUT, drain_until_closed(&mut self.stream))
            .await
            .map_err(|_| ChatError::Timeout("close handshake"))?
    }
}

/// Reads until the peer's close reply or the end of the stream.
async fn drain_until_closed(stream: &mut WsStream) -> Result<(), ChatError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Close(_))) | None => return Ok(()),
            Some(Ok(_)) => {}
            Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {
                return Ok(());
            }
            Some(Err(error)) => return Err(ChatError::Close(error)),
        }
    }
}
