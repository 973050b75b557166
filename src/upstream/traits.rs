//! Upstream dialer trait
//!
//! The relay core only needs one capability from the upstream side: open a
//! duplex byte stream that reaches a given destination.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::error::DialError;

/// Capability to open a tunnel to a destination through the upstream proxy
#[async_trait]
pub trait UpstreamDialer: Send + Sync {
    /// Open a stream that reaches `target`.
    ///
    /// The returned stream carries application bytes only; any proxy
    /// negotiation has already completed.
    ///
    /// # Errors
    ///
    /// Returns `DialError` if the proxy is unreachable, rejects the request,
    /// or does not answer within the connect timeout.
    async fn dial(&self, target: SocketAddr) -> Result<TcpStream, DialError>;

    /// Human readable name of the upstream, for logs
    fn relay(&self) -> &str;
}
