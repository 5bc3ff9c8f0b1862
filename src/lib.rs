//! # chat-ws
//!
//! Minimal WebSocket chat server and client.
//!
//! The server accepts WebSocket upgrades on one configured path and runs a
//! read loop per connection that logs every frame and publishes it on an
//! in-process message bus. Nothing is routed back to clients. The client
//! connects, sends text frames and closes with a close handshake.
//!
//! ## Architecture
//!
//! ```text
//! ChatClient ──ws──► HTTP listener (server/)
//!                        │
//!                        ├── GET {path}  ws_handler (ws/)
//!                        │      └── Connection read loop ──► MessageBus (domain/)
//!                        │
//!                        └── GET /health (api/)
//!
//! ConnectionRegistry (domain/) tracks live read loops for shutdown.
//! ```

pub mod api;
pub mod app_state;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod ws;

pub use client::ChatClient;
pub use config::ServerConfig;
pub use error::{ChatError, ConfigError};
pub use server::ChatServer;
