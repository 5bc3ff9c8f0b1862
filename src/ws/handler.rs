//! Axum WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::response::{IntoResponse, Response};

use super::connection::handle_connection;
use crate::app_state::AppState;
use crate::error::ChatError;

/// `GET {path}` — Upgrade HTTP connection to WebSocket.
///
/// Failures are answered on this exchange only: a stopping or full server
/// answers 503 before the request is inspected, and a malformed upgrade
/// request gets the status axum reports for it. The server keeps serving
/// other requests either way.
///
/// # Errors
///
/// Returns [`ChatError::UpgradeRejected`], [`ChatError::ServerStopping`] or
/// [`ChatError::TooManyConnections`], rendered as a JSON error response.
pub async fn ws_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ChatError> {
    tracing::debug!("got connection");

    let permit = state.admit().inspect_err(|error| {
        tracing::warn!(%error, "refusing connection");
    })?;

    let ws = upgrade.map_err(|rejection| {
        tracing::warn!(reason = %rejection.body_text(), "rejecting upgrade request");
        ChatError::UpgradeRejected {
            status: rejection.status(),
            reason: rejection.body_text(),
        }
    })?;

    // Keeps `stop` waiting until the socket is handed to its read loop.
    let pending = state.tracker.token();

    Ok(ws
        .on_failed_upgrade(|error| {
            tracing::warn!(%error, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            handle_connection(&state, socket, permit).await;
            drop(pending);
        })
        .into_response())
}
