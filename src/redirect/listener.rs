//! Listening socket for redirected TCP connections
//!
//! NAT redirection delivers connections to an ordinary local socket, so no
//! `IP_TRANSPARENT` or special capability is needed here; the socket is built
//! with socket2 only to control `SO_REUSEADDR` and the accept backlog.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::config::ListenConfig;
use crate::error::RedirectError;

/// A listener accepting NAT-redirected TCP connections
#[derive(Debug)]
pub struct RedirectListener {
    /// The underlying tokio TCP listener
    listener: TcpListener,

    /// Bound address (with the real port when binding to port 0)
    listen_addr: SocketAddr,
}

impl RedirectListener {
    /// Create and bind a new listener.
    ///
    /// # Errors
    ///
    /// Returns `RedirectError` if socket creation, an option, binding or
    /// listening fails. All of them are setup faults.
    pub fn bind(config: &ListenConfig) -> Result<Self, RedirectError> {
        debug!("Creating redirect listener on {}", config.address);

        let socket = Socket::new(
            Domain::for_address(config.address),
            Type::STREAM,
            Some(Protocol::TCP),
        )
        .map_err(|e| RedirectError::SocketCreation(e.to_string()))?;

        // Quick restart after shutdown
        socket
            .set_reuse_address(true)
            .map_err(|e| RedirectError::socket_option("SO_REUSEADDR", e.to_string()))?;

        socket
            .bind(&config.address.into())
            .map_err(|e| RedirectError::bind(config.address, e.to_string()))?;

        let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
        socket
            .listen(backlog)
            .map_err(|e| RedirectError::socket_option("listen", e.to_string()))?;

        // Set non-blocking for tokio compatibility
        socket
            .set_nonblocking(true)
            .map_err(|e| RedirectError::socket_option("O_NONBLOCK", e.to_string()))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| RedirectError::SocketCreation(e.to_string()))?;

        let listen_addr = listener.local_addr()?;

        info!(
            "Redirect listener ready on {} (backlog={})",
            listen_addr, config.backlog
        );

        Ok(Self {
            listener,
            listen_addr,
        })
    }

    /// Accept the next redirected connection.
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error so the caller can classify it.
    pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }

    /// Get the bound address
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}
