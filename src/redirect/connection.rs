//! Redirected connection representation
//!
//! A [`RedirectedConnection`] is an accepted TCP stream together with the
//! destination the client originally addressed.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tracing::debug;

use super::resolver::{DestinationResolver, OriginalDestination};
use crate::error::RedirectError;

/// An accepted connection paired with its original destination
#[derive(Debug)]
pub struct RedirectedConnection {
    /// The underlying TCP stream
    stream: TcpStream,

    /// Client's address (source)
    client_addr: SocketAddr,

    /// Where the client wanted to connect
    original_dst: OriginalDestination,

    /// When the connection was accepted
    accepted_at: Instant,
}

impl RedirectedConnection {
    /// Resolve the original destination of an accepted stream.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error; the stream is dropped (closed) with it.
    pub fn resolve(
        stream: TcpStream,
        client_addr: SocketAddr,
        resolver: &dyn DestinationResolver,
    ) -> Result<Self, RedirectError> {
        let original_dst = resolver.resolve(&stream)?;

        debug!("Redirected connection: {} -> {} (original)", client_addr, original_dst);

        Ok(Self::with_destination(stream, client_addr, original_dst))
    }

    /// Pair a stream with a destination that is already known.
    #[must_use]
    pub fn with_destination(
        stream: TcpStream,
        client_addr: SocketAddr,
        original_dst: OriginalDestination,
    ) -> Self {
        Self {
            stream,
            client_addr,
            original_dst,
            accepted_at: Instant::now(),
        }
    }

    /// Get the underlying TCP stream
    #[must_use]
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Consume the connection and return the underlying stream
    #[must_use]
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    /// Get the client's source address
    #[must_use]
    pub const fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Get the original destination
    #[must_use]
    pub const fn original_dst(&self) -> OriginalDestination {
        self.original_dst
    }

    /// Get the connection age
    #[must_use]
    pub fn age(&self) -> Duration {
        self.accepted_at.elapsed()
    }
}
