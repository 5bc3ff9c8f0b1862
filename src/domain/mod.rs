//! Domain layer: connection identity, chat messages, the message bus and
//! the live-connection registry.

pub mod connection_id;
pub mod connection_registry;
pub mod message;
pub mod message_bus;

pub use connection_id::ConnectionId;
pub use connection_registry::{ConnectionHandle, ConnectionRegistry};
pub use message::{ChatMessage, MessageBody};
pub use message_bus::MessageBus;
