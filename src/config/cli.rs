//! Command line interface
//!
//! Every flag can also be given through a `REDIRSOCKS_*` environment
//! variable; an explicit flag wins over the environment.

use std::net::SocketAddr;

use clap::Parser;

use super::types::{
    Config, ListenConfig, LogConfig, LogFormat, RelayConfig, UpstreamConfig, DEFAULT_BACKLOG,
    DEFAULT_BIND, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_KEEPALIVE_SECS, DEFAULT_RELAY,
};
use crate::error::ConfigError;
use crate::io::{CopyMode, DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY};

#[derive(Debug, Parser)]
#[command(
    name = "redirsocks",
    about = "Relay NAT-redirected TCP connections through a SOCKS5 proxy",
    version
)]
pub struct Cli {
    /// Address to accept redirected connections on
    #[arg(long, env = "REDIRSOCKS_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// SOCKS5 relay, [USER:PASS@]HOST:PORT
    #[arg(
        long,
        env = "REDIRSOCKS_RELAY",
        default_value = DEFAULT_RELAY,
        hide_env_values = true
    )]
    pub relay: String,

    /// Copy with a plain read/write loop instead of the buffered copy
    #[arg(long, env = "REDIRSOCKS_IOHACK")]
    pub iohack: bool,

    /// Enable debug logging
    #[arg(short, long, env = "REDIRSOCKS_DEBUG")]
    pub debug: bool,

    /// Log output format
    #[arg(long, env = "REDIRSOCKS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Listen backlog
    #[arg(long, env = "REDIRSOCKS_BACKLOG", default_value_t = DEFAULT_BACKLOG)]
    pub backlog: u32,

    /// Upstream connect timeout in seconds
    #[arg(long, env = "REDIRSOCKS_CONNECT_TIMEOUT", default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,

    /// Number of idle relay buffers kept for reuse
    #[arg(long, env = "REDIRSOCKS_POOL_CAPACITY", default_value_t = DEFAULT_POOL_CAPACITY)]
    pub pool_capacity: usize,

    /// Relay buffer size in bytes
    #[arg(long, env = "REDIRSOCKS_BUFFER_SIZE", default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,
}

impl Cli {
    /// Build and validate the runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value fails validation.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let config = Config {
            listen: ListenConfig {
                address: self.bind,
                backlog: self.backlog,
            },
            upstream: UpstreamConfig {
                relay: self.relay,
                connect_timeout_secs: self.connect_timeout,
            },
            relay: RelayConfig {
                copy_mode: CopyMode::from_iohack(self.iohack),
                pool_capacity: self.pool_capacity,
                buffer_size: self.buffer_size,
                keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            },
            log: LogConfig {
                debug: self.debug,
                format: self.log_format,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
