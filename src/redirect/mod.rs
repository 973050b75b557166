//! Redirect module for NAT-redirected connections
//!
//! This module accepts connections that netfilter redirected to a local port
//! and recovers the destination each client originally asked for.
//!
//! # Requirements
//!
//! - Linux with `nf_conntrack_ipv4` (and `nf_conntrack_ipv6` for IPv6)
//! - a NAT rule sending traffic to the listen port
//!
//! No extra capability is needed for the lookup itself; `SO_ORIGINAL_DST`
//! works for any process owning the socket.
//!
//! ## Example iptables Setup
//!
//! ```bash
//! # Send outgoing TCP from this host through the redirector,
//! # skipping the relay itself and local networks
//! iptables -t nat -N REDSOCKS
//! iptables -t nat -A REDSOCKS -d 10.0.0.80 -j RETURN
//! iptables -t nat -A REDSOCKS -d 127.0.0.0/8 -j RETURN
//! iptables -t nat -A REDSOCKS -p tcp -j REDIRECT --to-ports 1081
//! iptables -t nat -A OUTPUT -p tcp -j REDSOCKS
//!
//! # Same for IPv6
//! ip6tables -t nat -A OUTPUT -p tcp ! -d ::1 -j REDIRECT --to-ports 1081
//! ```
//!
//! # Other Platforms
//!
//! Without the Linux facility, [`KernelResolver`] returns the socket's own
//! local address instead and logs a warning at startup.

mod connection;
mod listener;
mod resolver;
mod socket;

pub use connection::RedirectedConnection;
pub use listener::RedirectListener;
pub use resolver::{
    default_resolver, DestinationResolver, FixedResolver, KernelResolver, OriginalDestination,
};
pub use socket::{
    family_of, port_from_octets, sockaddr_from_v4_raw, sockaddr_from_v6_raw, AddressFamily,
    IP6T_SO_ORIGINAL_DST, SO_ORIGINAL_DST,
};

#[cfg(target_os = "linux")]
pub use socket::{get_original_dst, get_original_dst_v6};
