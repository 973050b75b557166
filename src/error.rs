//! Error types for redirsocks
//!
//! Errors are grouped by subsystem. Setup faults (configuration, bind,
//! dialer construction) are fatal at startup; everything raised while a
//! session is running only terminates that session.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Top-level error type for redirsocks
#[derive(Debug, Error)]
pub enum RedirsocksError {
    /// Configuration errors (flag validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Redirect socket, listener and original-destination errors
    #[error("Redirect error: {0}")]
    Redirect(#[from] RedirectError),

    /// Upstream dial errors
    #[error("Dial error: {0}")]
    Dial(#[from] DialError),

    /// Errors while relaying a session
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RedirsocksError {
    /// Check if this error only affects a single session
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Redirect(e) => e.is_recoverable(),
            Self::Dial(e) => e.is_recoverable(),
            Self::Relay(e) => e.is_recoverable(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
            ),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Validation error (invalid values)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Upstream relay address could not be parsed
    #[error("Invalid relay address '{addr}': {reason}")]
    InvalidRelay { addr: String, reason: String },
}

impl ConfigError {
    /// Config errors are not recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }

    /// Create an invalid relay error
    pub fn invalid_relay(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRelay {
            addr: addr.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from the redirect side: listening socket and original destination lookup
#[derive(Debug, Error)]
pub enum RedirectError {
    /// Failed to create socket
    #[error("Failed to create listening socket: {0}")]
    SocketCreation(String),

    /// Failed to set socket option
    #[error("Failed to set socket option {option}: {reason}")]
    SocketOption { option: String, reason: String },

    /// Failed to bind to address
    #[error("Failed to bind to {addr}: {reason}")]
    BindError { addr: SocketAddr, reason: String },

    /// Failed to accept connection
    #[error("Accept error: {0}")]
    AcceptError(String),

    /// Failed to retrieve original destination
    #[error("Failed to get original destination: {0}")]
    OriginalDstError(String),

    /// I/O error
    #[error("Redirect I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl RedirectError {
    /// Check if this error is recoverable
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SocketCreation(_) | Self::SocketOption { .. } | Self::BindError { .. } => false,
            Self::AcceptError(_) | Self::OriginalDstError(_) => true,
            Self::IoError(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
        }
    }

    /// Create a socket option error
    pub fn socket_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SocketOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Create a bind error
    pub fn bind(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::BindError {
            addr,
            reason: reason.into(),
        }
    }
}

/// Errors while dialing the upstream SOCKS5 relay
#[derive(Debug, Error)]
pub enum DialError {
    /// Relay address is malformed (raised at construction)
    #[error("Invalid relay address: {0}")]
    InvalidRelay(String),

    /// TCP connect or SOCKS5 negotiation failed
    #[error("Failed to reach {target} via {relay}: {reason}")]
    ConnectionFailed {
        target: SocketAddr,
        relay: String,
        reason: String,
    },

    /// Dial did not complete in time
    #[error("Dial to {target} via {relay} timed out after {timeout_secs}s")]
    Timeout {
        target: SocketAddr,
        relay: String,
        timeout_secs: u64,
    },

    /// I/O error during dial
    #[error("Dial I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl DialError {
    /// Check if this error is recoverable
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidRelay(_) => false,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } => true,
            Self::IoError(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
            ),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(
        target: SocketAddr,
        relay: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConnectionFailed {
            target,
            relay: relay.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while a session is relaying
#[derive(Debug, Error)]
pub enum RelayError {
    /// Copy error in one direction
    #[error("Data transfer error ({direction}): {source}")]
    Transfer {
        direction: &'static str,
        #[source]
        source: io::Error,
    },

    /// Copy task panicked or was cancelled
    #[error("Copy task aborted: {0}")]
    TaskAborted(String),
}

impl RelayError {
    /// Transfer failures are terminal for their session only
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        true
    }

    /// Create a transfer error
    pub const fn transfer(direction: &'static str, source: io::Error) -> Self {
        Self::Transfer { direction, source }
    }
}

/// Type alias for Result with `RedirsocksError`
pub type Result<T> = std::result::Result<T, RedirsocksError>;
