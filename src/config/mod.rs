//! Configuration module for redirsocks
//!
//! Configuration comes from command line flags and `REDIRSOCKS_*` environment
//! variables only; there is no config file.
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use redirsocks::config::Cli;
//!
//! let config = Cli::parse().into_config().unwrap();
//! println!("Relaying through {}", config.upstream.redacted());
//! ```

mod cli;
mod types;

pub use cli::Cli;
pub use types::{
    Config, ListenConfig, LogConfig, LogFormat, RelayConfig, UpstreamConfig, DEFAULT_BACKLOG,
    DEFAULT_BIND, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_KEEPALIVE_SECS, DEFAULT_RELAY,
    MAX_BUFFER_SIZE, MIN_BUFFER_SIZE,
};
