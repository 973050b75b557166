//! redirsocks: transparent TCP redirector over SOCKS5
//!
//! This crate accepts TCP connections that netfilter NAT redirected to a local
//! port, recovers each connection's original destination from conntrack, and
//! relays the bytes through an upstream SOCKS5 proxy toward that destination.
//! Clients never see the proxy.
//!
//! # Features
//!
//! - **Original destination lookup**: `SO_ORIGINAL_DST` / `IP6T_SO_ORIGINAL_DST`
//! - **SOCKS5 upstream**: optional username/password authentication
//! - **Full-duplex relay**: both sockets closed as soon as either side finishes,
//!   at most one error reported per session
//! - **Leaky buffer pool**: bounded, lock-free reuse of relay buffers
//!
//! # Architecture
//!
//! ```text
//! Client → iptables REDIRECT → redirsocks → SOCKS5 relay → Destination
//!                                  ↓
//!                          SO_ORIGINAL_DST lookup
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use redirsocks::config::Config;
//! use redirsocks::io::BufferPool;
//! use redirsocks::redirect::KernelResolver;
//! use redirsocks::relay::{Redirector, Relay, RelayOptions, RelayStats};
//! use redirsocks::upstream::Socks5Dialer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//!
//! let relay = Arc::new(Relay::new(
//!     Arc::new(KernelResolver::new()),
//!     Arc::new(Socks5Dialer::new(&config.upstream)?),
//!     Arc::new(BufferPool::with_defaults()),
//!     Arc::new(RelayStats::new()),
//!     RelayOptions::from(&config.relay),
//! ));
//!
//! let handle = Redirector::new(relay).start(&config.listen)?;
//! // ... later
//! handle.stop();
//! handle.join().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration types and CLI
//! - [`error`]: Error types
//! - [`io`]: Buffer pool and copy strategies
//! - [`redirect`]: Listener and original destination lookup
//! - [`relay`]: Relay sessions, accept loop and statistics
//! - [`upstream`]: SOCKS5 dialer

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod io;
pub mod redirect;
pub mod relay;
pub mod upstream;

// Re-export commonly used types at the crate root
pub use config::{Cli, Config, ListenConfig, RelayConfig, UpstreamConfig};
pub use error::{ConfigError, DialError, RedirectError, RedirsocksError, RelayError};
pub use io::{BufferPool, CopyMode, PooledBuffer};
pub use redirect::{DestinationResolver, FixedResolver, KernelResolver, OriginalDestination};
pub use relay::{Redirector, RedirectorHandle, Relay, RelayOptions, RelayStats};
pub use upstream::{Socks5Dialer, UpstreamDialer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
