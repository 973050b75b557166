//! Upstream side of a relay session
//!
//! - [`UpstreamDialer`]: the dial capability the relay core depends on
//! - [`Socks5Dialer`]: production dialer through a SOCKS5 relay

mod socks5;
mod traits;

pub use socks5::{Credentials, RelayEndpoint, Socks5Dialer};
pub use traits::UpstreamDialer;
