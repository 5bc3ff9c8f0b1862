//! WebSocket layer: upgrade handling and the per-connection read loop.
//!
//! The upgrade endpoint lives at the configured path (e.g. `/chat/ws`).
//! Every accepted socket gets its own read loop that logs and publishes the
//! frames it receives; nothing is written back except close frames.

pub mod connection;
pub mod handler;

pub use connection::handle_connection;
pub use handler::ws_handler;
