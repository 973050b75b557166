//! Configuration types for redirsocks
//!
//! This module defines the runtime configuration. It is built from command
//! line flags and environment variables (see [`Cli`](super::Cli)) and
//! validated once at startup.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::io::{CopyMode, DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY};
use crate::upstream::RelayEndpoint;

/// Default listen address
pub const DEFAULT_BIND: &str = "0.0.0.0:1081";

/// Default SOCKS5 relay
pub const DEFAULT_RELAY: &str = "10.0.0.80:1080";

/// Default accept backlog
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Default upstream connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default TCP keep-alive time in seconds
pub const DEFAULT_KEEPALIVE_SECS: u64 = 20;

/// Smallest accepted relay buffer
pub const MIN_BUFFER_SIZE: usize = 512;

/// Largest accepted relay buffer
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Listening socket
    pub listen: ListenConfig,

    /// Upstream SOCKS5 relay
    pub upstream: UpstreamConfig,

    /// Session tunables
    pub relay: RelayConfig,

    /// Logging
    pub log: LogConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any section is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen.validate()?;
        self.upstream.validate()?;
        self.relay.validate()?;
        Ok(())
    }
}

/// Listen configuration
#[derive(Debug, Clone)]
pub struct ListenConfig {
    /// Listen address (e.g., "0.0.0.0:1081")
    pub address: SocketAddr,

    /// TCP accept backlog
    pub backlog: u32,
}

impl ListenConfig {
    /// Validate listen configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the backlog is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog == 0 {
            return Err(ConfigError::ValidationError(
                "backlog must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], 1081)),
            backlog: DEFAULT_BACKLOG,
        }
    }
}

/// Upstream SOCKS5 relay configuration
#[derive(Clone)]
pub struct UpstreamConfig {
    /// Relay address, `[USER:PASS@]HOST:PORT`
    pub relay: String,

    /// Connect + handshake timeout in seconds
    pub connect_timeout_secs: u64,
}

impl UpstreamConfig {
    /// Validate upstream configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidRelay` if the relay address is malformed,
    /// or `ConfigError::ValidationError` for a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = RelayEndpoint::parse(&self.relay) {
            return Err(ConfigError::invalid_relay(self.redacted(), e.to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "connect timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Connect timeout as a duration
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Relay address with any password masked
    #[must_use]
    pub fn redacted(&self) -> String {
        match RelayEndpoint::parse(&self.relay) {
            Ok(endpoint) => endpoint.to_string(),
            Err(_) => match self.relay.rsplit_once('@') {
                Some((_, hostport)) => format!("***@{hostport}"),
                None => self.relay.clone(),
            },
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("relay", &self.redacted())
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            relay: DEFAULT_RELAY.into(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Relay session configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Copy strategy (`--iohack` selects `Manual`)
    pub copy_mode: CopyMode,

    /// Maximum number of idle buffers kept in the pool
    pub pool_capacity: usize,

    /// Size of each relay buffer in bytes
    pub buffer_size: usize,

    /// TCP keep-alive time and interval in seconds
    pub keepalive_secs: u64,
}

impl RelayConfig {
    /// Validate relay configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "pool capacity must be greater than 0".into(),
            ));
        }

        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(ConfigError::ValidationError(format!(
                "buffer size must be between {MIN_BUFFER_SIZE} and {MAX_BUFFER_SIZE} bytes, got {}",
                self.buffer_size
            )));
        }

        if self.keepalive_secs == 0 {
            return Err(ConfigError::ValidationError(
                "keep-alive time must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            copy_mode: CopyMode::default(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            buffer_size: DEFAULT_BUFFER_SIZE,
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    /// Raise the default level from info to debug
    pub debug: bool,

    /// Output format
    pub format: LogFormat,
}

impl LogConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[must_use]
    pub const fn default_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}
