//! Destination resolvers
//!
//! A [`DestinationResolver`] turns an accepted socket into the address the
//! client originally tried to reach. Production code uses
//! [`KernelResolver`]; tests and static forwards use [`FixedResolver`].

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use socket2::SockRef;
use tokio::net::TcpStream;
use tracing::{trace, warn};

use super::socket::{family_of, AddressFamily};
use crate::error::RedirectError;

/// The pre-redirect destination of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginalDestination {
    addr: SocketAddr,
}

impl OriginalDestination {
    /// Wrap a resolved socket address
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Address family of the destination
    #[must_use]
    pub const fn family(&self) -> AddressFamily {
        match self.addr {
            SocketAddr::V4(_) => AddressFamily::V4,
            SocketAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Destination IP
    #[must_use]
    pub const fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    /// Destination port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Destination as a socket address
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl From<SocketAddr> for OriginalDestination {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl fmt::Display for OriginalDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.addr, f)
    }
}

/// Capability to recover the original destination of an accepted socket.
pub trait DestinationResolver: Send + Sync {
    /// Resolve the destination the client intended to reach.
    ///
    /// # Errors
    ///
    /// Returns `RedirectError::OriginalDstError` if the kernel has no record
    /// of a redirect for this socket. Failures are never retried.
    fn resolve(&self, stream: &TcpStream) -> Result<OriginalDestination, RedirectError>;
}

/// Resolver backed by the kernel's conntrack state.
///
/// On Linux this issues `SO_ORIGINAL_DST` / `IP6T_SO_ORIGINAL_DST`. Other
/// platforms have no such facility: the resolver then reports the socket's
/// own local address, which makes every session relay to where we listen.
#[derive(Debug, Clone, Default)]
pub struct KernelResolver;

impl KernelResolver {
    /// Create a kernel resolver, warning if the platform cannot resolve redirects.
    #[must_use]
    pub fn new() -> Self {
        if !Self::is_supported() {
            warn!(
                "Original destination lookup is not supported on this platform; \
                 sessions will be relayed to the listening address"
            );
        }
        Self
    }

    /// Whether this platform supports original destination lookup
    #[must_use]
    pub const fn is_supported() -> bool {
        cfg!(target_os = "linux")
    }
}

impl DestinationResolver for KernelResolver {
    #[cfg(target_os = "linux")]
    fn resolve(&self, stream: &TcpStream) -> Result<OriginalDestination, RedirectError> {
        use std::os::unix::io::AsRawFd;

        use super::socket::{get_original_dst, get_original_dst_v6};

        // Keep the descriptor non-blocking; the reactor depends on it
        SockRef::from(stream)
            .set_nonblocking(true)
            .map_err(|e| RedirectError::socket_option("O_NONBLOCK", e.to_string()))?;

        let local = stream.local_addr()?;
        let fd = stream.as_raw_fd();
        let family = family_of(&local);
        trace!("Querying original destination (fd={}, family={})", fd, family);

        let addr = match family {
            AddressFamily::V4 => get_original_dst(fd)?,
            AddressFamily::V6 => get_original_dst_v6(fd)?,
        };
        Ok(OriginalDestination::new(addr))
    }

    #[cfg(not(target_os = "linux"))]
    fn resolve(&self, stream: &TcpStream) -> Result<OriginalDestination, RedirectError> {
        SockRef::from(stream)
            .set_nonblocking(true)
            .map_err(|e| RedirectError::socket_option("O_NONBLOCK", e.to_string()))?;

        let local = stream.local_addr()?;
        trace!(
            "No redirect support, using local {} address {}",
            family_of(&local),
            local
        );
        Ok(OriginalDestination::new(local))
    }
}

/// Resolver that always reports the same destination.
#[derive(Debug, Clone, Copy)]
pub struct FixedResolver {
    destination: OriginalDestination,
}

impl FixedResolver {
    /// Create a resolver that always answers `destination`
    #[must_use]
    pub const fn new(destination: SocketAddr) -> Self {
        Self {
            destination: OriginalDestination::new(destination),
        }
    }
}

impl DestinationResolver for FixedResolver {
    fn resolve(&self, _stream: &TcpStream) -> Result<OriginalDestination, RedirectError> {
        Ok(self.destination)
    }
}

/// Get the default resolver for this platform
#[must_use]
pub fn default_resolver() -> Arc<dyn DestinationResolver> {
    Arc::new(KernelResolver::new())
}
