//! Error types with HTTP status code mapping.
//!
//! [`ConfigError`] covers invalid configuration and is returned
//! synchronously by constructors. [`ChatError`] is the central error type
//! for everything else; the variants raised while answering an upgrade
//! request map to an HTTP status code and a structured JSON error body, so a
//! bad request only fails its own exchange.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio_tungstenite::tungstenite;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2002,
///     "message": "server is shutting down"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Invalid server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The upgrade path is empty.
    #[error("path must be non-empty")]
    EmptyPath,

    /// The upgrade path does not start with `/`.
    #[error("path must start with '/': {0}")]
    PathNotAbsolute(String),

    /// The upgrade path collides with a built-in route.
    #[error("path is reserved: {0}")]
    ReservedPath(String),

    /// The message bus capacity is zero.
    #[error("message bus capacity must be greater than zero")]
    ZeroCapacity,

    /// The message bus capacity exceeds what a broadcast channel supports.
    #[error("message bus capacity {capacity} exceeds the maximum of {max}")]
    CapacityTooLarge {
        /// Requested capacity.
        capacity: usize,
        /// Largest accepted capacity.
        max: usize,
    },

    /// `max_connections` was set to zero.
    #[error("max connections must be greater than zero when set")]
    ZeroMaxConnections,

    /// `max_connections` exceeds what the admission semaphore supports.
    #[error("max connections {requested} exceeds the maximum of {max}")]
    MaxConnectionsTooLarge {
        /// Requested bound.
        requested: usize,
        /// Largest accepted bound.
        max: usize,
    },

    /// An environment variable is set but could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        key: &'static str,
        /// Raw value found in the environment.
        value: String,
    },
}

/// Chat server and client errors.
///
/// # Error Code Ranges
///
/// | Range     | Category      | HTTP Status               |
/// |-----------|---------------|---------------------------|
/// | 1000–1999 | Configuration | 500 Internal Server Error |
/// | 2000–2999 | Upgrade       | 4xx / 503                 |
/// | 3000–3999 | Listener      | 500 Internal Server Error |
/// | 4000–4999 | Transport     | 502 / 504                 |
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The TCP listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The HTTP listener stopped with an error.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// The WebSocket handshake with the remote server failed.
    #[error("dial failed: {0}")]
    Dial(#[source] tungstenite::Error),

    /// Writing a frame failed.
    #[error("write failed: {0}")]
    Write(#[source] tungstenite::Error),

    /// Closing the socket failed.
    #[error("close failed: {0}")]
    Close(#[source] tungstenite::Error),

    /// An operation did not complete in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The HTTP request could not be upgraded to a WebSocket.
    #[error("upgrade rejected: {reason}")]
    UpgradeRejected {
        /// Status reported for the rejected request.
        status: StatusCode,
        /// Why the request was rejected.
        reason: String,
    },

    /// The server is shutting down and accepts no new connections.
    #[error("server is shutting down")]
    ServerStopping,

    /// `max_connections` connections are already open.
    #[error("too many open connections")]
    TooManyConnections,

    /// Some connections were still open when the drain timeout elapsed.
    #[error("{remaining} connection(s) still open after drain timeout")]
    DrainTimeout {
        /// Connections still registered.
        remaining: usize,
    },
}

impl ChatError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Config(_) => 1001,
            Self::UpgradeRejected { .. } => 2001,
            Self::ServerStopping => 2002,
            Self::TooManyConnections => 2003,
            Self::Bind { .. } => 3001,
            Self::Serve(_) => 3002,
            Self::DrainTimeout { .. } => 3003,
            Self::Dial(_) => 4001,
            Self::Write(_) => 4002,
            Self::Close(_) => 4003,
            Self::Timeout(_) => 4004,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::UpgradeRejected { status, .. } => *status,
            Self::ServerStopping | Self::TooManyConnections => StatusCode::SERVICE_UNAVAILABLE,
            Self::Dial(_) | Self::Write(_) | Self::Close(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Config(_) | Self::Bind { .. } | Self::Serve(_) | Self::DrainTimeout { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_are_service_unavailable() {
        assert_eq!(
            ChatError::ServerStopping.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ChatError::TooManyConnections.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn upgrade_rejection_keeps_its_status() {
        let err = ChatError::UpgradeRejected {
            status: StatusCode::METHOD_NOT_ALLOWED,
            reason: "method not GET".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.error_code(), 2001);
    }

    #[test]
    fn config_error_converts() {
        let err: ChatError = ConfigError::EmptyPath.into();
        assert!(matches!(err, ChatError::Config(ConfigError::EmptyPath)));
        assert_eq!(err.to_string(), "configuration error: path must be non-empty");
    }

    #[test]
    fn into_response_sets_status() {
        let response = ChatError::TooManyConnections.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn error_body_serializes() {
        let body = ErrorResponse {
            error: ErrorBody {
                code: 2002,
                message: "server is shutting down".to_string(),
            },
        };
        let Ok(json) = serde_json::to_value(&body) else {
            panic!("serialization failed");
        };
        assert_eq!(json["error"]["code"], 2002);
        assert_eq!(json["error"]["message"], "server is shutting down");
    }
}
