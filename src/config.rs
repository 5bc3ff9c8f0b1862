//! Server configuration.
//!
//! [`ServerConfig`] is either built in code via [`ServerConfig::new`] and the
//! `with_*` methods, or loaded from environment variables (and an optional
//! `.env` file via `dotenvy`) with [`ServerConfig::from_env`]. Every field has
//! a documented default and the whole structure is validated once, before a
//! server is created.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::ConfigError;

/// Port used when [`ServerConfig::port`] is `None`.
pub const DEFAULT_PORT: u16 = 8080;

/// Upgrade path used by [`ServerConfig::from_env`] when `CHAT_PATH` is unset.
pub const DEFAULT_PATH: &str = "/chat/ws";

/// Default capacity of the message bus ring buffer.
pub const DEFAULT_MESSAGE_BUS_CAPACITY: usize = 1024;

/// Largest accepted message bus capacity.
///
/// The broadcast ring buffer is allocated up front, so this stays far below
/// the channel's own limit of `usize::MAX / 2`.
pub const MAX_MESSAGE_BUS_CAPACITY: usize = 1 << 16;

/// Largest `max_connections` the admission semaphore accepts.
pub const MAX_CONNECTIONS_LIMIT: usize = Semaphore::MAX_PERMITS;

/// Default time [`crate::server::ChatServer::stop`] waits for read loops.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Path of the health endpoint; cannot be used as the upgrade path.
pub const HEALTH_PATH: &str = "/health";

/// Chat server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind. Defaults to `0.0.0.0`.
    pub host: IpAddr,

    /// TCP port. `None` means [`DEFAULT_PORT`]; `Some(0)` lets the OS pick.
    pub port: Option<u16>,

    /// HTTP path that accepts WebSocket upgrades (e.g. `/chat/ws`).
    pub path: String,

    /// Upper bound on simultaneously open connections. `None` = unbounded.
    pub max_connections: Option<usize>,

    /// Capacity of the broadcast channel backing the message bus.
    pub message_bus_capacity: usize,

    /// How long `stop` waits for open connections to finish.
    pub drain_timeout: Duration,
}

impl ServerConfig {
    /// Creates a configuration for the given upgrade path with all other
    /// fields at their defaults.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: None,
            path: path.into(),
            max_connections: None,
            message_bus_capacity: DEFAULT_MESSAGE_BUS_CAPACITY,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Sets the interface to bind.
    #[must_use]
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Sets the TCP port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Bounds the number of simultaneously open connections.
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets the message bus capacity.
    #[must_use]
    pub fn with_message_bus_capacity(mut self, capacity: usize) -> Self {
        self.message_bus_capacity = capacity;
        self
    }

    /// Sets the drain timeout used by `stop`.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file, then
    /// reads `CHAT_HOST`, `CHAT_PORT`, `CHAT_PATH`, `CHAT_MAX_CONNECTIONS`,
    /// `CHAT_MESSAGE_BUS_CAPACITY` and `CHAT_DRAIN_TIMEOUT_SECS`. Unset
    /// variables fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if a variable is set but cannot be
    /// parsed, or any error from [`ServerConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = std::env::var("CHAT_PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::new(path);

        if let Some(host) = parse_env("CHAT_HOST")? {
            config.host = host;
        }
        config.port = parse_env("CHAT_PORT")?;
        config.max_connections = parse_env("CHAT_MAX_CONNECTIONS")?;
        if let Some(capacity) = parse_env("CHAT_MESSAGE_BUS_CAPACITY")? {
            config.message_bus_capacity = capacity;
        }
        if let Some(secs) = parse_env::<u64>("CHAT_DRAIN_TIMEOUT_SECS")? {
            config.drain_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks every field for consistency.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyPath`] if `path` is empty.
    /// - [`ConfigError::PathNotAbsolute`] if `path` does not start with `/`.
    /// - [`ConfigError::ReservedPath`] if `path` is the health endpoint.
    /// - [`ConfigError::ZeroCapacity`] if the bus capacity is zero.
    /// - [`ConfigError::CapacityTooLarge`] if the bus capacity is above
    ///   [`MAX_MESSAGE_BUS_CAPACITY`].
    /// - [`ConfigError::ZeroMaxConnections`] if `max_connections` is `Some(0)`.
    /// - [`ConfigError::MaxConnectionsTooLarge`] if `max_connections` is above
    ///   [`MAX_CONNECTIONS_LIMIT`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.is_empty() {
            return Err(ConfigError::EmptyPath);
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::PathNotAbsolute(self.path.clone()));
        }
        if self.path == HEALTH_PATH {
            return Err(ConfigError::ReservedPath(self.path.clone()));
        }
        if self.message_bus_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.message_bus_capacity > MAX_MESSAGE_BUS_CAPACITY {
            return Err(ConfigError::CapacityTooLarge {
                capacity: self.message_bus_capacity,
                max: MAX_MESSAGE_BUS_CAPACITY,
            });
        }
        match self.max_connections {
            Some(0) => return Err(ConfigError::ZeroMaxConnections),
            Some(requested) if requested > MAX_CONNECTIONS_LIMIT => {
                return Err(ConfigError::MaxConnectionsTooLarge {
                    requested,
                    max: MAX_CONNECTIONS_LIMIT,
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Socket address to bind, with the port default applied.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.unwrap_or(DEFAULT_PORT))
    }
}

/// Parses an environment variable as `T`. Unset yields `Ok(None)`; set but
/// unparsable yields [`ConfigError::InvalidEnv`].
fn parse_env<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
        Err(_) => Ok(None),
    }
}
