//! HTTP routes served next to the WebSocket endpoint.

pub mod handlers;

use axum::Router;

use crate::app_state::AppState;

/// Builds the router with all non-WebSocket endpoints.
pub fn build_router() -> Router<AppState> {
    handlers::system::routes()
}
