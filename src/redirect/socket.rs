//! Original destination lookup on redirected sockets
//!
//! When netfilter NAT (`-j REDIRECT` / `-j DNAT`) rewrites a connection to a
//! local port, conntrack remembers the pre-NAT destination. Linux exposes it
//! through `getsockopt(SO_ORIGINAL_DST)` at the `SOL_IP` level, and through
//! `IP6T_SO_ORIGINAL_DST` at the `SOL_IPV6` level for IPv6.
//!
//! The lookup requires `nf_conntrack_ipv4` / `nf_conntrack_ipv6` to be loaded.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

#[cfg(target_os = "linux")]
use std::io;
#[cfg(target_os = "linux")]
use std::mem;
#[cfg(target_os = "linux")]
use std::os::unix::io::RawFd;

#[cfg(target_os = "linux")]
use crate::error::RedirectError;

/// Linux kernel constant: `SO_ORIGINAL_DST` (`SOL_IP` level)
pub const SO_ORIGINAL_DST: i32 = 80;

/// Linux kernel constant: `IP6T_SO_ORIGINAL_DST` (`SOL_IPV6` level)
pub const IP6T_SO_ORIGINAL_DST: i32 = 80;

/// Address family of a redirected connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4 (`sockaddr_in`)
    V4,
    /// IPv6 (`sockaddr_in6`)
    V6,
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 => write!(f, "ipv4"),
            Self::V6 => write!(f, "ipv6"),
        }
    }
}

/// Pick the lookup family from the accepted socket's local address.
///
/// IPv4-mapped IPv6 addresses (dual-stack listeners) are tracked by the IPv4
/// conntrack table, so they use the IPv4 query.
#[must_use]
pub fn family_of(local: &SocketAddr) -> AddressFamily {
    match local.ip() {
        IpAddr::V4(_) => AddressFamily::V4,
        IpAddr::V6(v6) if v6.to_ipv4_mapped().is_some() => AddressFamily::V4,
        IpAddr::V6(_) => AddressFamily::V6,
    }
}

/// Decode a port stored in network byte order as `high * 256 + low`.
#[must_use]
pub const fn port_from_octets(octets: [u8; 2]) -> u16 {
    (octets[0] as u16) * 256 + octets[1] as u16
}

/// Build a destination from raw IPv4 address bytes and the raw port octets.
#[must_use]
pub fn sockaddr_from_v4_raw(addr: [u8; 4], port: [u8; 2]) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(addr), port_from_octets(port)))
}

/// Build a destination from raw IPv6 address bytes and the raw port octets.
#[must_use]
pub fn sockaddr_from_v6_raw(addr: [u8; 16], port: [u8; 2]) -> SocketAddr {
    SocketAddr::V6(SocketAddrV6::new(
        Ipv6Addr::from(addr),
        port_from_octets(port),
        0,
        0,
    ))
}

/// Query the IPv4 original destination of a redirected TCP connection.
///
/// # Errors
///
/// Returns `RedirectError::OriginalDstError` if the socket was not redirected
/// or the conntrack module is not loaded.
#[cfg(target_os = "linux")]
pub fn get_original_dst(fd: RawFd) -> Result<SocketAddr, RedirectError> {
    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_IP,
            SO_ORIGINAL_DST,
            std::ptr::addr_of_mut!(addr).cast::<libc::c_void>(),
            &raw mut len,
        )
    };

    if ret != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            return Err(RedirectError::OriginalDstError(format!(
                "no conntrack entry, connection was not redirected: {err}"
            )));
        }
        return Err(RedirectError::OriginalDstError(format!(
            "getsockopt SO_ORIGINAL_DST failed: {err}"
        )));
    }

    // s_addr and sin_port hold network-order bytes in memory order
    let ip = addr.sin_addr.s_addr.to_ne_bytes();
    let port = addr.sin_port.to_ne_bytes();
    Ok(sockaddr_from_v4_raw(ip, port))
}

/// Query the IPv6 original destination of a redirected TCP connection.
///
/// # Errors
///
/// Returns `RedirectError::OriginalDstError` if retrieval fails.
#[cfg(target_os = "linux")]
pub fn get_original_dst_v6(fd: RawFd) -> Result<SocketAddr, RedirectError> {
    let mut addr: libc::sockaddr_in6 = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;

    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_IPV6,
            IP6T_SO_ORIGINAL_DST,
            std::ptr::addr_of_mut!(addr).cast::<libc::c_void>(),
            &raw mut len,
        )
    };

    if ret != 0 {
        let err = io::Error::last_os_error();
        return Err(RedirectError::OriginalDstError(format!(
            "getsockopt IP6T_SO_ORIGINAL_DST failed: {err}"
        )));
    }

    let port = addr.sin6_port.to_ne_bytes();
    Ok(sockaddr_from_v6_raw(addr.sin6_addr.s6_addr, port))
}
